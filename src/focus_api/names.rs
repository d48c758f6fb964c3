//! Static tables and heuristics turning raw OS identifiers into the names usage is reported
//! under. Kept free of OS calls so they can be tested anywhere.

/// macOS bundle identifiers of apps whose process name isn't what users call them.
const BUNDLE_NAMES: &[(&str, &str)] = &[
    ("com.microsoft.VSCode", "Visual Studio Code"),
    ("com.microsoft.VSCodeInsiders", "Visual Studio Code - Insiders"),
    ("com.google.Chrome", "Google Chrome"),
    ("com.apple.Safari", "Safari"),
    ("com.apple.finder", "Finder"),
    ("com.apple.Terminal", "Terminal"),
    ("com.github.atom", "Atom"),
    ("com.sublimetext.4", "Sublime Text"),
    ("com.jetbrains.intellij", "IntelliJ IDEA"),
    ("com.jetbrains.WebStorm", "WebStorm"),
    ("com.slack.Slack", "Slack"),
    ("com.tinyspeck.slackmacgap", "Slack"),
    ("com.spotify.client", "Spotify"),
    ("com.figma.Desktop", "Figma"),
    ("com.electron.devdocs-app", "DevDocs"),
    ("com.electron.whatsapp-for-mac", "WhatsApp"),
    ("com.postmanlabs.mac", "Postman"),
];

/// Process names hosting several different applications. Their window title decides the app.
const HOST_PROCESSES: &[&str] = &["Electron"];

/// Window title fragments identifying an app running inside a host process.
const TITLE_MARKERS: &[(&str, &str)] = &[
    ("Visual Studio Code", "Visual Studio Code"),
    ("Slack", "Slack"),
    ("WhatsApp", "WhatsApp"),
    ("Discord", "Discord"),
];

/// Processes that own focus without being an application the user works in.
const SENTINEL_PROCESSES: &[&str] = &["loginwindow", "System Events"];

/// Lowercase Windows executable stems and their display names.
const EXECUTABLE_NAMES: &[(&str, &str)] = &[
    ("chrome", "Google Chrome"),
    ("msedge", "Microsoft Edge"),
    ("firefox", "Firefox"),
    ("code", "Visual Studio Code"),
    ("explorer", "File Explorer"),
    ("winword", "Microsoft Word"),
    ("excel", "Microsoft Excel"),
    ("powerpnt", "Microsoft PowerPoint"),
    ("outlook", "Microsoft Outlook"),
    ("teams", "Microsoft Teams"),
    ("slack", "Slack"),
    ("discord", "Discord"),
    ("spotify", "Spotify"),
    ("notepad", "Notepad"),
    ("windowsterminal", "Windows Terminal"),
    ("devenv", "Visual Studio"),
];

/// Windows executables whose windows belong to another app. The window title names the app.
const WINDOWS_HOST_EXECUTABLES: &[&str] = &["ApplicationFrameHost", "electron"];

/// Executables looked for when the foreground window can't be queried at all, in priority
/// order.
pub const WELL_KNOWN_EXECUTABLES: &[&str] = &[
    "code.exe",
    "chrome.exe",
    "msedge.exe",
    "firefox.exe",
    "slack.exe",
];

pub fn bundle_display_name(bundle_id: &str, process_name: &str) -> String {
    BUNDLE_NAMES
        .iter()
        .find(|(bundle, _)| *bundle == bundle_id)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| process_name.to_string())
}

pub fn title_display_name(process_name: &str, window_title: &str) -> String {
    if !HOST_PROCESSES.contains(&process_name) || window_title.is_empty() {
        return process_name.to_string();
    }
    TITLE_MARKERS
        .iter()
        .find(|(marker, _)| window_title.contains(marker))
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| process_name.to_string())
}

pub fn is_sentinel_process(process_name: &str) -> bool {
    SENTINEL_PROCESSES.contains(&process_name)
}

/// Maps a Windows executable (bare name or full path) to its display name. Unknown executables
/// are matched by substring before falling back to the file stem.
pub fn executable_display_name(executable: &str) -> String {
    // Split by hand, paths reported by Windows use backslashes whatever the build host is.
    let file_name = executable
        .rsplit(['\\', '/'])
        .next()
        .unwrap_or(executable)
        .to_string();
    let stem = file_name
        .rsplit_once('.')
        .filter(|(_, extension)| extension.eq_ignore_ascii_case("exe"))
        .map(|(stem, _)| stem.to_string())
        .unwrap_or(file_name);
    let lowercase = stem.to_lowercase();

    if let Some((_, name)) = EXECUTABLE_NAMES.iter().find(|(exe, _)| *exe == lowercase) {
        return name.to_string();
    }
    EXECUTABLE_NAMES
        .iter()
        .find(|(exe, _)| exe.len() > 4 && lowercase.contains(exe))
        .map(|(_, name)| name.to_string())
        .unwrap_or(stem)
}

/// Display name of a Windows foreground window. Host executables are resolved through the
/// title, first by known markers and then by its last ` - ` segment.
pub fn window_display_name(executable: &str, window_title: &str) -> String {
    let name = executable_display_name(executable);
    let title = window_title.trim();
    if title.is_empty()
        || !WINDOWS_HOST_EXECUTABLES
            .iter()
            .any(|host| host.eq_ignore_ascii_case(&name))
    {
        return name;
    }
    TITLE_MARKERS
        .iter()
        .find(|(marker, _)| title.contains(marker))
        .map(|(_, app)| app.to_string())
        .or_else(|| title.rsplit(" - ").next().map(|v| v.trim().to_string()))
        .filter(|v| !v.is_empty())
        .unwrap_or(name)
}

/// Splits `left|right` script output. Scripts print `error` when they fail.
pub fn parse_pair(output: &str) -> Option<(&str, &str)> {
    let output = output.trim();
    if output == "error" {
        return None;
    }
    output
        .split_once('|')
        .map(|(left, right)| (left.trim(), right.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_names() {
        assert_eq!(
            bundle_display_name("com.microsoft.VSCode", "Electron"),
            "Visual Studio Code"
        );
        assert_eq!(bundle_display_name("org.unknown.app", "Unknown"), "Unknown");
    }

    #[test]
    fn test_title_disambiguates_host_processes() {
        assert_eq!(
            title_display_name("Electron", "main.rs - crate - Visual Studio Code"),
            "Visual Studio Code"
        );
        assert_eq!(title_display_name("Electron", "general - Slack"), "Slack");
        assert_eq!(title_display_name("Electron", ""), "Electron");
        assert_eq!(title_display_name("Safari", "Slack pricing"), "Safari");
    }

    #[test]
    fn test_sentinels() {
        assert!(is_sentinel_process("loginwindow"));
        assert!(is_sentinel_process("System Events"));
        assert!(!is_sentinel_process("Finder"));
    }

    #[test]
    fn test_executable_names() {
        assert_eq!(
            executable_display_name(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
            "Google Chrome"
        );
        assert_eq!(executable_display_name("Code.exe"), "Visual Studio Code");
        assert_eq!(executable_display_name("SlackSetup.exe"), "Slack");
        assert_eq!(executable_display_name("game.exe"), "game");
    }

    #[test]
    fn test_window_title_resolves_hosts() {
        assert_eq!(
            window_display_name(r"C:\Windows\System32\ApplicationFrameHost.exe", "Calculator"),
            "Calculator"
        );
        assert_eq!(window_display_name("electron.exe", "general - Slack"), "Slack");
        assert_eq!(
            window_display_name("chrome.exe", "Slack pricing - Google Chrome"),
            "Google Chrome"
        );
        assert_eq!(
            window_display_name("ApplicationFrameHost.exe", " "),
            "ApplicationFrameHost"
        );
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(
            parse_pair("com.apple.Safari|Safari\n"),
            Some(("com.apple.Safari", "Safari"))
        );
        assert_eq!(parse_pair("Electron|"), Some(("Electron", "")));
        assert_eq!(parse_pair("error"), None);
        assert_eq!(parse_pair("Safari"), None);
    }
}
