//! Structured data embedded in commit messages.
//!
//! ```text
//! Release 1.2.3
//!
//! CHANGELOG:
//! Fixed the thing
//! Added the other thing
//!
//! VERSIONCODE:
//! 10203
//! ```

const CHANGELOG_MARKER: &str = "CHANGELOG:";
const VERSION_CODE_MARKER: &str = "VERSIONCODE:";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitData {
    pub changelog: String,
    pub version_code: Option<u64>,
}

pub fn parse(message: &str) -> CommitData {
    CommitData {
        changelog: changelog(message),
        version_code: version_code(message),
    }
}

/// All lines after `CHANGELOG:` up to the next blank line, or the end of the
/// message if there is none.
fn changelog(message: &str) -> String {
    let mut lines = message.lines();
    if !lines.any(|line| line.trim_end_matches('\r') == CHANGELOG_MARKER) {
        return String::new();
    }

    lines
        .map(|line| line.trim_end_matches('\r'))
        .take_while(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn version_code(message: &str) -> Option<u64> {
    let mut lines = message.lines();
    lines.find(|line| line.trim_end_matches('\r') == VERSION_CODE_MARKER)?;
    lines.next()?.trim().parse().ok()
}
