//! Status alias table. This is the only place raw status text becomes a [`Status`].

use crate::model::Status;

static STATUS_ALIASES: &[(&str, Status)] = &[
    ("p", Status::Present),
    ("present", Status::Present),
    ("attended", Status::Present),
    ("in attendance", Status::Present),
    ("here", Status::Present),
    ("yes", Status::Present),
    ("y", Status::Present),
    ("a", Status::Absent),
    ("absent", Status::Absent),
    ("unexcused", Status::Absent),
    ("unexcused absence", Status::Absent),
    ("no show", Status::Absent),
    ("noshow", Status::Absent),
    ("missed", Status::Absent),
    ("x", Status::Absent),
    ("no", Status::Absent),
    ("n", Status::Absent),
    ("e", Status::Excused),
    ("ex", Status::Excused),
    ("excused", Status::Excused),
    ("excused absence", Status::Excused),
    ("l", Status::Late),
    ("t", Status::Late),
    ("late", Status::Late),
    ("tardy", Status::Late),
    ("late arrival", Status::Late),
    ("unknown", Status::Unknown),
    ("?", Status::Unknown),
];

/// Maps raw status text to a [`Status`], case-insensitively.
///
/// Returns `None` for blank or unrecognised text; the caller decides how to
/// report it.
pub fn normalize_status(raw: &str) -> Option<Status> {
    let key = normalize_key(raw);
    if key.is_empty() {
        return None;
    }
    STATUS_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, status)| *status)
}

fn normalize_key(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
