const MASK: &str = "*****";

/// Redacts an email-like subject down to the first and last character of the local part, plus the domain.
/// `jane.doe@example.com` becomes `j*****e@example.com`.
///
/// Subjects that are not email-like are returned unchanged, except that a local part too short to keep two characters
/// of is masked after its first character.
pub fn mask_subject(subject: &str) -> String {
    let Some((local, domain)) = subject.split_once('@') else {
        return subject.to_string();
    };
    if local.is_empty() || domain.is_empty() {
        return subject.to_string();
    }
    let mut chars = local.chars();
    let first = chars.next().unwrap_or_default();
    match chars.last() {
        Some(last) if local.chars().count() > 2 => format!("{first}{MASK}{last}@{domain}"),
        _ => format!("{first}{MASK}@{domain}"),
    }
}
