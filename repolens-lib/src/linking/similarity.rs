use crate::model::{CommitRecord, Identity};
use strsim::normalized_levenshtein;

/// Similarity of two texts in `[0, 1]`, ignoring case and surrounding whitespace.
///
/// Computed as `1 - levenshtein(a, b) / max(len(a), len(b))`. Empty input never counts as similar.
#[must_use]
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    normalized_levenshtein(&a, &b)
}

/// Whether a commit's author is the pull request's creator.
///
/// Matches when the emails are equal, when the commit author contains the creator's display
/// name, or when the email local parts agree across different domains.
#[must_use]
pub fn authors_match(commit: &CommitRecord, creator: &Identity) -> bool {
    let commit_email = commit.author_email.trim();

    if let Some(creator_email) = creator.email() {
        let creator_email = creator_email.trim();
        if !commit_email.is_empty() && commit_email.eq_ignore_ascii_case(creator_email) {
            return true;
        }

        if let (Some(commit_local), Some(creator_local)) = (local_part(commit_email), local_part(creator_email))
            && commit_local.eq_ignore_ascii_case(creator_local)
        {
            return true;
        }
    }

    let display_name = creator.display_name.trim();
    !display_name.is_empty() && commit.author.to_lowercase().contains(&display_name.to_lowercase())
}

fn local_part(email: &str) -> Option<&str> {
    email.split_once('@').map(|(local, _)| local.trim()).filter(|local| !local.is_empty())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use chrono::Utc;

    fn commit(author: &str, email: &str) -> CommitRecord {
        CommitRecord {
            hash: "c0ffee".into(),
            author: author.into(),
            author_email: email.into(),
            date: Utc::now(),
            message: "Change".into(),
            is_merge: false,
        }
    }

    fn creator(display_name: &str, unique_name: &str) -> Identity {
        Identity {
            display_name: display_name.into(),
            unique_name: unique_name.into(),
        }
    }

    #[test]
    fn test_similarity_bounds() {
        assert!((text_similarity("Add parser", "add parser ") - 1.0).abs() < f64::EPSILON);
        assert!(text_similarity("Add parser", "Remove everything else") < 0.5);
        assert!(text_similarity("", "") < f64::EPSILON);
        assert!(text_similarity("abc", "") < f64::EPSILON);
    }

    #[test]
    fn test_similarity_is_edit_distance_ratio() {
        let score = text_similarity("kitten", "sitting");
        assert!((score - (1.0 - 3.0 / 7.0)).abs() < 1e-9);
    }

    #[test]
    fn test_email_match_ignores_case() {
        assert!(authors_match(&commit("Somebody", "Ada@Contoso.com"), &creator("Ada Lovelace", "ada@contoso.com")));
    }

    #[test]
    fn test_display_name_match() {
        assert!(authors_match(&commit("Ada Lovelace (Contoso)", ""), &creator("Ada Lovelace", "CONTOSO\\ada")));
    }

    #[test]
    fn test_local_part_match_across_domains() {
        assert!(authors_match(&commit("A. L.", "ada@users.noreply.example"), &creator("Countess", "ada@contoso.com")));
    }

    #[test]
    fn test_empty_values_never_match() {
        assert!(!authors_match(&commit("Ada", ""), &creator("", "")));
        assert!(!authors_match(&commit("Ada", "@example.com"), &creator("", "@contoso.com")));
        assert!(!authors_match(&commit("Grace Hopper", "grace@navy.mil"), &creator("Ada Lovelace", "ada@contoso.com")));
    }
}
