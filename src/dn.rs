//! Distinguished name helpers
//!
//! Just enough DN handling for suffix routing and massage: RDN splitting
//! that honours backslash escapes, case-folding normalization, and
//! suffix tests/replacement on normalized forms.

/// Split a DN into its RDN components, trimming surrounding whitespace
pub fn split_rdns(dn: &str) -> Vec<&str> {
    let mut rdns = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (i, ch) in dn.char_indices() {
        match ch {
            '\\' if !escaped => escaped = true,
            ',' if !escaped => {
                rdns.push(dn[start..i].trim());
                start = i + 1;
            }
            _ => escaped = false,
        }
    }

    let last = dn[start..].trim();
    if !last.is_empty() || !rdns.is_empty() {
        rdns.push(last);
    }
    rdns
}

/// Normalize a single RDN: lowercase, no whitespace around `=` or `+`
fn normalize_rdn(rdn: &str) -> String {
    rdn.split('+')
        .map(|ava| match ava.split_once('=') {
            Some((ty, value)) => format!(
                "{}={}",
                ty.trim().to_lowercase(),
                value.trim().to_lowercase()
            ),
            None => ava.trim().to_lowercase(),
        })
        .collect::<Vec<_>>()
        .join("+")
}

/// Normalized form used for comparisons and cache keys
pub fn normalize(dn: &str) -> String {
    split_rdns(dn)
        .into_iter()
        .map(normalize_rdn)
        .collect::<Vec<_>>()
        .join(",")
}

/// Check that every RDN has a non-empty attribute type. The empty DN is valid.
pub fn is_valid(dn: &str) -> bool {
    split_rdns(dn).iter().all(|rdn| {
        !rdn.is_empty()
            && rdn
                .split('+')
                .all(|ava| matches!(ava.split_once('='), Some((ty, _)) if !ty.trim().is_empty()))
    })
}

/// Number of leading RDNs of `dn` above `suffix`, if `dn` lies within it.
///
/// Compares RDN by RDN on normalized forms, so an escaped comma inside a
/// value never counts as a boundary.
fn leading_rdns(dn: &str, suffix: &str) -> Option<usize> {
    let dn: Vec<String> = split_rdns(dn).into_iter().map(normalize_rdn).collect();
    let suffix: Vec<String> = split_rdns(suffix).into_iter().map(normalize_rdn).collect();

    let keep = dn.len().checked_sub(suffix.len())?;
    (dn[keep..] == suffix[..]).then_some(keep)
}

/// Whether `dn` equals `suffix` or lies beneath it (both compared normalized)
pub fn is_within(dn: &str, suffix: &str) -> bool {
    leading_rdns(dn, suffix).is_some()
}

/// Replace `from` with `to` at the tail of `dn`.
///
/// The leading RDNs of `dn` keep their original spelling. Returns `None`
/// when `dn` is not within `from`.
pub fn replace_suffix(dn: &str, from: &str, to: &str) -> Option<String> {
    let keep = leading_rdns(dn, from)?;
    let to = to.trim();

    let mut out: Vec<&str> = split_rdns(dn)[..keep].to_vec();
    if !to.is_empty() {
        out.push(to);
    }
    Some(out.join(","))
}
