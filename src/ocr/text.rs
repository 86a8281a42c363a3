pub(super) fn join_inline(left: &str, right: &str) -> String {
    if needs_space(left, right) {
        format!("{} {}", left.trim_end(), right.trim_start())
    } else {
        format!("{}{}", left.trim_end(), right.trim_start())
    }
}

/// Scripts written without word spacing (CJK) come back from tesseract as
/// separate words; only alphabetic or numeric neighbours get a space.
pub(super) fn needs_space(left: &str, right: &str) -> bool {
    let last = left.chars().rev().find(|ch| !ch.is_whitespace());
    let first = right.chars().find(|ch| !ch.is_whitespace());
    match (last, first) {
        (Some(a), Some(b)) if is_cjk(a) || is_cjk(b) => false,
        (Some(a), Some(_)) if a.is_ascii_punctuation() && a != '.' && a != ',' => {
            !matches!(a, '(' | '[' | '{' | '"' | '\'')
        }
        (Some(_), Some(_)) => true,
        _ => false,
    }
}

fn is_cjk(ch: char) -> bool {
    matches!(ch as u32,
        0x3040..=0x30ff
        | 0x3400..=0x4dbf
        | 0x4e00..=0x9fff
        | 0xf900..=0xfaff
        | 0xff00..=0xffef
        | 0x3000..=0x303f)
}
