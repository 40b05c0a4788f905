//! Canonical-name grammar and label-directory derivation.
//!
//! Ported from `original_source/util/NameUtility.py`. `cname := Label " - "
//! Title (" (" Note ")")?`.

/// True if `name` conforms to the `Label - Title[ (Note)]` convention.
pub fn name_is_canonical(name: &str) -> bool {
    let name = name.strip_suffix(".rar").unwrap_or(name);
    name.split(" - ").count() > 1
        && !name.starts_with(' ')
        && !name.ends_with(' ')
        && !name.contains('.')
        && !name.contains("  ")
}

/// Splits a cname (or archive filename) into (label, title, note).
pub fn divide_cname(cname: &str) -> (String, String, String) {
    let cname = cname.strip_suffix(".rar").unwrap_or(cname);
    let parts: Vec<&str> = cname.split(" - ").collect();
    let label = parts[0].to_string();
    let mut title = parts[1..].join(" - ");
    let mut note = String::new();
    if title.contains(" (") && title.ends_with(')') {
        if let Some(idx) = title.rfind(" (") {
            let candidate = &title[idx + 2..title.len() - 1];
            note = candidate.to_string();
            title = title[..idx].to_string();
        }
    }
    (label, title, note)
}

/// Reassembles (label, title, note) into a cname, the inverse of
/// `divide_cname` for any input that passed `name_is_canonical`.
pub fn join_cname(label: &str, title: &str, note: &str) -> String {
    if note.is_empty() {
        format!("{} - {}", label, title)
    } else {
        format!("{} - {} ({})", label, title, note)
    }
}

/// The file extension on a basename, or "" when there is none (dotfiles,
/// no dot, or a trailing space in the extension all count as "none").
pub fn file_extension(fname: &str) -> String {
    let parts: Vec<&str> = fname.rsplitn(2, '.').collect();
    if parts.len() < 2 {
        return String::new();
    }
    let ext = parts[0];
    if ext.is_empty() || ext == fname || ext.contains(' ') {
        return String::new();
    }
    for prefix in [".", "_.", "._."] {
        if format!("{}{}", prefix, ext) == fname {
            return String::new();
        }
    }
    ext.to_string()
}

/// The label directory (snake_case) for a canonically-named cname.
pub fn label_dir_from_cname(cname: &str) -> String {
    cname
        .split(" - ")
        .next()
        .unwrap_or(cname)
        .to_lowercase()
        .replace(' ', "_")
}

const MEDIA_TYPE_LABELS: [&str; 6] = [" CDM", "CDR", "CDS", " MCD", " EP", " LP"];

pub fn title_has_media_type_label(title: &str) -> bool {
    MEDIA_TYPE_LABELS.iter().any(|l| title.contains(l))
}

/// Strips media-type labels (`CDM|CDR|CDS|MCD|EP|LP`, optionally followed
/// by a single digit) from `title`, used by metadata workers' retry pass.
pub fn drop_media_type_labels(title: &str) -> String {
    use regex::Regex;
    let patterns = [r"\b(MCD|CD(M|M?S|R))\d?\b", r"\b[EL]P\d?\b"];
    let mut out = title.to_string();
    for p in patterns {
        let re = Regex::new(p).expect("static regex");
        out = re.replace_all(&out, "").to_string();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names() {
        assert!(name_is_canonical("Acme Sounds - Pack Vol 1"));
        assert!(name_is_canonical("Acme Sounds - Pack Vol 1 (Remaster)"));
        assert!(!name_is_canonical("Acme Sounds Pack Vol 1"));
        assert!(!name_is_canonical(" Acme Sounds - Pack"));
        assert!(!name_is_canonical("Acme Sounds - Pack "));
        assert!(!name_is_canonical("Acme Sounds - Pack.v2"));
        assert!(!name_is_canonical("Acme  Sounds - Pack"));
    }

    #[test]
    fn divide_and_rejoin_round_trips() {
        for cname in [
            "Acme Sounds - Pack Vol 1",
            "Acme Sounds - Pack Vol 1 (Remaster)",
            "Acme Sounds - Drum & Bass - Vol 1 (2026 Reissue)",
        ] {
            assert!(name_is_canonical(cname));
            let (label, title, note) = divide_cname(cname);
            assert_eq!(join_cname(&label, &title, &note), cname);
        }
    }

    #[test]
    fn label_dir_lowercases_and_underscores() {
        assert_eq!(label_dir_from_cname("Acme Sounds - Pack Vol 1"), "acme_sounds");
    }

    #[test]
    fn extension_edge_cases() {
        assert_eq!(file_extension("kick.wav"), "wav");
        assert_eq!(file_extension("noext"), "");
        assert_eq!(file_extension(".hidden"), "");
        assert_eq!(file_extension("a. b"), "");
    }

    #[test]
    fn media_type_label_stripping() {
        assert_eq!(drop_media_type_labels("Pack Title CDM1"), "Pack Title ");
        assert_eq!(drop_media_type_labels("Pack Title EP"), "Pack Title ");
    }
}
