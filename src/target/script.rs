//! Python snippets sent to the target and markers read back from its output

use std::path::{Path, PathBuf};

/// Capture resolution requested from the editor
pub const CAPTURE_WIDTH: u32 = 1920;
pub const CAPTURE_HEIGHT: u32 = 1080;

/// Output markers printed by screenshot scripts queued by the web app
const PATH_MARKERS: [&str; 2] = ["SCREENSHOT_PATH:", "SCREENSHOT_SAVED:"];

/// Build the capture-flavored command for `destination`
pub fn capture_script(destination: &Path) -> String {
    // Forward slashes work on every host; JSON string escaping is valid Python
    let path = destination.to_string_lossy().replace('\\', "/");
    let dir = match path.rsplit_once('/') {
        Some(("", _)) => "/",
        Some((dir, _)) => dir,
        None => ".",
    };
    let dir_literal = serde_json::Value::String(dir.to_string()).to_string();
    let literal = serde_json::Value::String(path).to_string();

    format!(
        "import os\n\
         import unreal\n\
         os.makedirs({dir}, exist_ok=True)\n\
         unreal.AutomationLibrary.take_high_res_screenshot({w}, {h}, {path})\n\
         print(\"SCREENSHOT_PATH:\" + {path})\n",
        dir = dir_literal,
        w = CAPTURE_WIDTH,
        h = CAPTURE_HEIGHT,
        path = literal,
    )
}

/// Find a capture path the command itself reported in its output
///
/// The Remote Control response wraps the Python log, so the marker may be
/// followed by JSON punctuation; anything after the file extension is cut.
pub fn reported_capture_path(output: &str) -> Option<PathBuf> {
    PATH_MARKERS.iter().find_map(|marker| {
        let start = output.find(marker)? + marker.len();
        let rest = &output[start..];
        let end = rest
            .find(|c: char| c == '"' || c == '\n' || c == '\r')
            .unwrap_or(rest.len());
        let candidate = rest[..end].trim();
        let candidate = match candidate.to_ascii_lowercase().find(".png") {
            Some(idx) => &candidate[..idx + 4],
            None => candidate,
        };
        (!candidate.is_empty()).then(|| PathBuf::from(candidate))
    })
}
