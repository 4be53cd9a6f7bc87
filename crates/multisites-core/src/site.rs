//! Site sets, site collaborators and per-request site context.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Serialize;

pub type SiteId = i64;

/// The sites a report spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteSet {
    All,
    Only(Vec<SiteId>),
}

impl SiteSet {
    /// `true` for an explicit list that matched nothing.
    pub fn is_empty(&self) -> bool {
        matches!(self, SiteSet::Only(ids) if ids.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteMatch {
    pub id: SiteId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteInfo {
    pub id: SiteId,
    pub name: String,
    pub main_url: Option<String>,
    pub ecommerce: bool,
    pub group: Option<String>,
}

#[async_trait]
pub trait SiteSearch: Send + Sync + 'static {
    /// Sites whose name or URL match `pattern`, ordered by id.
    async fn match_pattern(&self, pattern: &str) -> Result<Vec<SiteMatch>>;
}

#[async_trait]
pub trait SiteDirectory: Send + Sync + 'static {
    async fn all_sites(&self) -> Result<Vec<SiteId>>;

    /// Sites `login` may view. `None` means the anonymous user.
    async fn viewable_sites(&self, login: Option<&str>) -> Result<Vec<SiteId>>;

    async fn site(&self, id: SiteId) -> Result<Option<SiteInfo>>;

    async fn display_name(&self, id: SiteId) -> Result<String> {
        self.site(id)
            .await?
            .map(|s| s.name)
            .ok_or_else(|| anyhow!("site {id} not found"))
    }

    async fn is_ecommerce_enabled(&self, id: SiteId) -> Result<bool> {
        self.site(id)
            .await?
            .map(|s| s.ecommerce)
            .ok_or_else(|| anyhow!("site {id} not found"))
    }
}

/// Who is asking, and in what execution mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub login: Option<String>,
    pub is_super_user: bool,
    pub is_scheduled_task: bool,
}

impl Caller {
    pub fn super_user() -> Self {
        Self {
            login: None,
            is_super_user: true,
            is_scheduled_task: false,
        }
    }

    pub fn user(login: &str) -> Self {
        Self {
            login: Some(login.to_string()),
            is_super_user: false,
            is_scheduled_task: false,
        }
    }

    pub fn scheduled(mut self) -> Self {
        self.is_scheduled_task = true;
        self
    }
}

/// Concrete sites in scope for one request. Passed explicitly to archive
/// fetches instead of living in process-wide state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteContext {
    pub sites: Vec<SiteId>,
}

/// Turn an optional name/URL pattern into a site set.
pub async fn resolve_sites(search: &dyn SiteSearch, pattern: Option<&str>) -> Result<SiteSet> {
    let Some(pattern) = pattern.map(str::trim).filter(|p| !p.is_empty()) else {
        return Ok(SiteSet::All);
    };
    let matches = search.match_pattern(pattern).await?;
    Ok(SiteSet::Only(matches.into_iter().map(|m| m.id).collect()))
}

/// Decide which concrete sites the request may touch.
///
/// Only an interactive super user gets every known site. Scheduled tasks run
/// with super-user rights but always get the access-restricted set.
///
/// `restrict_to_login` can only narrow scope: it is honoured for super users
/// and for callers naming themselves, anyone else keeps their own login.
pub async fn prepare_site_context(
    directory: &dyn SiteDirectory,
    sites: &SiteSet,
    restrict_to_login: Option<&str>,
    caller: &Caller,
) -> Result<SiteContext> {
    let unrestricted = caller.is_super_user && !caller.is_scheduled_task;
    let own_login = caller.login.as_deref();
    let scope_login = match restrict_to_login {
        Some(login) if caller.is_super_user || own_login == Some(login) => Some(login),
        _ => own_login,
    };

    let sites = match sites {
        SiteSet::All if unrestricted => directory.all_sites().await?,
        SiteSet::All => {
            directory
                .viewable_sites(scope_login)
                .await?
        }
        SiteSet::Only(ids) if unrestricted => ids.clone(),
        SiteSet::Only(ids) => {
            let viewable = directory
                .viewable_sites(scope_login)
                .await?;
            ids.iter()
                .copied()
                .filter(|id| viewable.contains(id))
                .collect()
        }
    };

    Ok(SiteContext { sites })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Directory;

    #[async_trait]
    impl SiteDirectory for Directory {
        async fn all_sites(&self) -> Result<Vec<SiteId>> {
            Ok(vec![1, 2, 3, 4])
        }

        async fn viewable_sites(&self, login: Option<&str>) -> Result<Vec<SiteId>> {
            Ok(match login {
                Some("alice") => vec![2, 4],
                _ => vec![],
            })
        }

        async fn site(&self, id: SiteId) -> Result<Option<SiteInfo>> {
            Ok(Some(SiteInfo {
                id,
                name: format!("Site {id}"),
                main_url: None,
                ecommerce: false,
                group: None,
            }))
        }
    }

    struct Search;

    #[async_trait]
    impl SiteSearch for Search {
        async fn match_pattern(&self, pattern: &str) -> Result<Vec<SiteMatch>> {
            Ok(match pattern {
                "shop" => vec![
                    SiteMatch {
                        id: 3,
                        name: "shop".into(),
                    },
                    SiteMatch {
                        id: 1,
                        name: "shop-eu".into(),
                    },
                ],
                _ => vec![],
            })
        }
    }

    #[tokio::test]
    async fn no_pattern_means_all_sites() {
        assert_eq!(resolve_sites(&Search, None).await.expect("all"), SiteSet::All);
        assert_eq!(
            resolve_sites(&Search, Some("  ")).await.expect("all"),
            SiteSet::All
        );
    }

    #[tokio::test]
    async fn pattern_keeps_search_order() {
        let set = resolve_sites(&Search, Some("shop")).await.expect("set");
        assert_eq!(set, SiteSet::Only(vec![3, 1]));
        let none = resolve_sites(&Search, Some("nothing")).await.expect("set");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn interactive_super_user_sees_everything() {
        let ctx = prepare_site_context(&Directory, &SiteSet::All, None, &Caller::super_user())
            .await
            .expect("ctx");
        assert_eq!(ctx.sites, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn scheduled_super_user_is_restricted() {
        let caller = Caller::super_user().scheduled();
        let ctx = prepare_site_context(&Directory, &SiteSet::All, Some("alice"), &caller)
            .await
            .expect("ctx");
        assert_eq!(ctx.sites, vec![2, 4]);

        let anonymous = prepare_site_context(&Directory, &SiteSet::All, None, &caller)
            .await
            .expect("ctx");
        assert!(anonymous.sites.is_empty());
    }

    #[tokio::test]
    async fn explicit_sites_filtered_for_regular_user() {
        let ctx = prepare_site_context(
            &Directory,
            &SiteSet::Only(vec![4, 1, 2]),
            None,
            &Caller::user("alice"),
        )
        .await
        .expect("ctx");
        assert_eq!(ctx.sites, vec![4, 2]);
    }

    #[tokio::test]
    async fn restrict_to_login_cannot_widen_scope() {
        let bob = prepare_site_context(
            &Directory,
            &SiteSet::All,
            Some("alice"),
            &Caller::user("bob"),
        )
        .await
        .expect("ctx");
        assert!(bob.sites.is_empty());

        let anonymous = prepare_site_context(
            &Directory,
            &SiteSet::Only(vec![2, 4]),
            Some("alice"),
            &Caller::default(),
        )
        .await
        .expect("ctx");
        assert!(anonymous.sites.is_empty());

        let herself = prepare_site_context(
            &Directory,
            &SiteSet::All,
            Some("alice"),
            &Caller::user("alice"),
        )
        .await
        .expect("ctx");
        assert_eq!(herself.sites, vec![2, 4]);
    }

    #[tokio::test]
    async fn default_display_name_uses_site_lookup() {
        assert_eq!(
            Directory.display_name(7).await.expect("name"),
            "Site 7".to_string()
        );
    }
}
