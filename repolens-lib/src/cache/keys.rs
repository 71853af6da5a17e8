//! Cache key grammar: `azure-devops:{type}:{component}(:{component})*`.

const PREFIX: &str = "azure-devops";

/// Builds a key from a type and its components. Colons inside components are replaced so they
/// cannot introduce extra segments.
#[must_use]
pub fn cache_key(kind: &str, components: &[&str]) -> String {
    let mut key = format!("{PREFIX}:{}", sanitize(kind));
    for component in components {
        key.push(':');
        key.push_str(&sanitize(component));
    }
    key
}

/// Key of a single raw pull request.
#[must_use]
pub fn pull_request_key(id: u64) -> String {
    cache_key("pr", &[&id.to_string()])
}

/// Key of a single processed pull request, used when incremental merging is off.
#[must_use]
pub fn processed_pull_request_key(id: u64) -> String {
    cache_key("processed-pr", &[&id.to_string()])
}

/// Key of the processed collection for an organization, project, and optional repository.
///
/// `filters` is the digest of non-default query filters, which becomes a trailing component.
#[must_use]
pub fn processed_collection_key(organization: &str, project: &str, repository: Option<&str>, filters: Option<&str>) -> String {
    let scope = format!("{organization}-{project}-{}", repository.unwrap_or("all"));
    match filters {
        Some(digest) => cache_key("analytics", &["processed-prs", &scope, digest]),
        None => cache_key("analytics", &["processed-prs", &scope]),
    }
}

fn sanitize(component: &str) -> String {
    component.replace(':', "_")
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_pull_request_key() {
        assert_eq!(pull_request_key(1234), "azure-devops:pr:1234");
    }

    #[test]
    fn test_collection_key() {
        assert_eq!(
            processed_collection_key("org", "project", Some("repo"), None),
            "azure-devops:analytics:processed-prs:org-project-repo"
        );
        assert_eq!(
            processed_collection_key("org", "project", None, None),
            "azure-devops:analytics:processed-prs:org-project-all"
        );
        assert_eq!(
            processed_collection_key("org", "project", Some("repo"), Some("0a1b2c3d4e5f")),
            "azure-devops:analytics:processed-prs:org-project-repo:0a1b2c3d4e5f"
        );
    }

    #[test]
    fn test_components_cannot_add_segments() {
        assert_eq!(cache_key("pr", &["a:b"]), "azure-devops:pr:a_b");
    }
}
