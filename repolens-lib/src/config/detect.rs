use super::partial::PartialConfig;
use percent_encoding::percent_decode_str;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static SSH_REMOTE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[^@/]+@)?(?:ssh\.dev\.azure\.com|vs-ssh\.visualstudio\.com):v3/([^/]+)/([^/]+)/([^/]+?)/?$").expect("invalid regex")
});

/// Organization, project, and repository named by an Azure Repos remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    pub organization: String,
    pub project: String,
    pub repository: String,
}

impl RemoteLocation {
    /// Parses the remote URL forms Azure Repos hands out:
    ///
    /// - `https://dev.azure.com/{org}/{project}/_git/{repo}`
    /// - `https://{org}.visualstudio.com/[DefaultCollection/]{project}/_git/{repo}`
    /// - `git@ssh.dev.azure.com:v3/{org}/{project}/{repo}`
    #[must_use]
    pub fn parse(remote: &str) -> Option<Self> {
        let remote = remote.trim();

        if let Some(captures) = SSH_REMOTE_REGEX.captures(remote) {
            return Self::from_parts(&captures[1], &captures[2], &captures[3]);
        }

        let url = Url::parse(remote).ok()?;
        let host = url.host_str()?.to_ascii_lowercase();
        let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();

        match host.as_str() {
            "dev.azure.com" => match segments.as_slice() {
                [org, project, "_git", repo] => Self::from_parts(org, project, repo),
                _ => None,
            },
            _ => {
                let org = host.strip_suffix(".visualstudio.com")?;
                match segments.as_slice() {
                    [project, "_git", repo] | ["DefaultCollection", project, "_git", repo] => Self::from_parts(org, project, repo),
                    _ => None,
                }
            }
        }
    }

    fn from_parts(org: &str, project: &str, repo: &str) -> Option<Self> {
        let decode = |s: &str| percent_decode_str(s).decode_utf8().ok().map(|s| s.into_owned());
        let repository = decode(repo)?;
        let repository = repository.strip_suffix(".git").map_or_else(|| repository.clone(), str::to_string);

        Some(Self {
            organization: decode(org)?,
            project: decode(project)?,
            repository,
        })
    }

    /// A configuration layer carrying this location.
    #[must_use]
    pub fn into_partial(self) -> PartialConfig {
        PartialConfig {
            organization: Some(self.organization),
            project: Some(self.project),
            repository: Some(self.repository),
            ..PartialConfig::default()
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn location(org: &str, project: &str, repo: &str) -> Option<RemoteLocation> {
        Some(RemoteLocation {
            organization: org.into(),
            project: project.into(),
            repository: repo.into(),
        })
    }

    #[test]
    fn test_dev_azure_https() {
        assert_eq!(
            RemoteLocation::parse("https://contoso@dev.azure.com/contoso/Fabrikam%20Fiber/_git/web"),
            location("contoso", "Fabrikam Fiber", "web")
        );
    }

    #[test]
    fn test_visualstudio_https() {
        assert_eq!(
            RemoteLocation::parse("https://contoso.visualstudio.com/Fabrikam/_git/api"),
            location("contoso", "Fabrikam", "api")
        );
        assert_eq!(
            RemoteLocation::parse("https://contoso.visualstudio.com/DefaultCollection/Fabrikam/_git/api"),
            location("contoso", "Fabrikam", "api")
        );
    }

    #[test]
    fn test_ssh() {
        assert_eq!(
            RemoteLocation::parse("git@ssh.dev.azure.com:v3/contoso/Fabrikam/api"),
            location("contoso", "Fabrikam", "api")
        );
        assert_eq!(
            RemoteLocation::parse("contoso@vs-ssh.visualstudio.com:v3/contoso/Fabrikam/api"),
            location("contoso", "Fabrikam", "api")
        );
    }

    #[test]
    fn test_foreign_remotes_are_ignored() {
        assert_eq!(RemoteLocation::parse("https://github.com/rust-lang/rust.git"), None);
        assert_eq!(RemoteLocation::parse("git@github.com:rust-lang/rust.git"), None);
        assert_eq!(RemoteLocation::parse("https://dev.azure.com/contoso/Fabrikam"), None);
        assert_eq!(RemoteLocation::parse(""), None);
    }

    #[test]
    fn test_into_partial() {
        let partial = location("o", "p", "r").unwrap().into_partial();
        assert_eq!(partial.organization.as_deref(), Some("o"));
        assert_eq!(partial.project.as_deref(), Some("p"));
        assert_eq!(partial.repository.as_deref(), Some("r"));
    }
}
