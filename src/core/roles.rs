//! Role archetype classification of users.

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use super::{
    indicators::{error::IndicatorError, types::IndicatorResult, value::Value},
    store::{DataStore, Params, Record},
};
use crate::config::indicators::IndicatorsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Archetype {
    Student,
    Teacher,
    Staff,
}

impl Archetype {
    /// Role archetypes (as stored on roles) that make up this archetype.
    pub fn role_archetypes(self) -> &'static [&'static str] {
        match self {
            Archetype::Student => &["student"],
            Archetype::Teacher => &["teacher", "editingteacher"],
            Archetype::Staff => &["manager"],
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Archetype::Student => "student",
            Archetype::Teacher => "teacher",
            Archetype::Staff => "staff",
        })
    }
}

#[async_trait]
pub trait RolePolicy: Send + Sync {
    /// Whether `user_id` belongs to `archetype`.
    async fn match_policy(&self, user_id: i64, archetype: Archetype) -> IndicatorResult<bool>;

    /// Active local users belonging to `archetype`.
    async fn count_users(&self, archetype: Archetype) -> IndicatorResult<i64>;
}

const ROLE_ASSIGNMENTS_SQL: &str = "
    SELECT
        r.archetype AS archetype,
        COUNT(ra.id) AS ras
    FROM
        {role} r
    LEFT JOIN
        {role_assignments} ra
    ON
        ra.roleid = r.id
    WHERE
        ra.userid = ?
    GROUP BY
        r.archetype
";

/// Classification from role assignments, with site admins counted as staff only.
pub struct StandardRolePolicy {
    store: Arc<dyn DataStore>,
    site_admins: Vec<i64>,
    mnet_localhost_id: i64,
}

impl StandardRolePolicy {
    pub fn new(store: Arc<dyn DataStore>, config: &IndicatorsConfig) -> Self {
        StandardRolePolicy {
            store,
            site_admins: config.site.site_admins.clone(),
            mnet_localhost_id: config.site.mnet_localhost_id,
        }
    }

    async fn assignments(&self, user_id: i64) -> IndicatorResult<HashMap<String, i64>> {
        let rows = self
            .store
            .get_records_sql(ROLE_ASSIGNMENTS_SQL, &Params::positional([user_id]))
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| Some((r.get_str("archetype")?, r.get_i64("ras").unwrap_or(0))))
            .collect())
    }
}

fn holds(assignments: &HashMap<String, i64>, archetype: Archetype) -> bool {
    archetype
        .role_archetypes()
        .iter()
        .any(|a| assignments.get(*a).copied().unwrap_or(0) > 0)
}

#[async_trait]
impl RolePolicy for StandardRolePolicy {
    async fn match_policy(&self, user_id: i64, archetype: Archetype) -> IndicatorResult<bool> {
        if self.site_admins.contains(&user_id) {
            return Ok(archetype == Archetype::Staff);
        }

        let ras = self.assignments(user_id).await?;
        let staff = holds(&ras, Archetype::Staff);
        let teacher = holds(&ras, Archetype::Teacher);
        let matched = match archetype {
            Archetype::Staff => staff,
            Archetype::Teacher => !staff && teacher,
            Archetype::Student => !staff && !teacher && holds(&ras, Archetype::Student),
        };
        trace!(user_id, %archetype, matched, "role policy");
        Ok(matched)
    }

    async fn count_users(&self, archetype: Archetype) -> IndicatorResult<i64> {
        let roles = archetype.role_archetypes();
        let placeholders = vec!["?"; roles.len()].join(",");
        let sql = format!(
            "
            SELECT
                COUNT(DISTINCT ra.userid)
            FROM
                {{role}} r
            LEFT JOIN
                {{role_assignments}} ra
            ON
                ra.roleid = r.id
            LEFT JOIN
                {{user}} u
            ON
                ra.userid = u.id
            WHERE
                u.deleted = 0 AND
                u.suspended = 0 AND
                r.archetype IN ({}) AND
                u.mnethostid = ?
            ",
            placeholders
        );
        let mut params: Vec<Value> = roles.iter().map(|r| Value::from(*r)).collect();
        params.push(Value::from(self.mnet_localhost_id));
        self.store
            .count_records_sql(&sql, &Params::Positional(params))
            .await
    }
}

/// Profile fields marking membership, by archetype. `cdt` holders count as teachers.
const ENT_FIELDS: [(&str, Archetype); 4] = [
    ("eleve", Archetype::Student),
    ("enseignant", Archetype::Teacher),
    ("cdt", Archetype::Teacher),
    ("administration", Archetype::Staff),
];

/// Classification from user profile status fields, as provisioned by
/// regional school platforms.
pub struct EntRolePolicy {
    store: Arc<dyn DataStore>,
    mnet_localhost_id: i64,
    fields: OnceCell<HashMap<Archetype, Vec<i64>>>,
}

impl EntRolePolicy {
    pub fn new(store: Arc<dyn DataStore>, config: &IndicatorsConfig) -> Self {
        EntRolePolicy {
            store,
            mnet_localhost_id: config.site.mnet_localhost_id,
            fields: OnceCell::new(),
        }
    }

    /// Field ids of `archetype`, resolved once. Fields missing on the site are left out.
    async fn field_ids(&self, archetype: Archetype) -> IndicatorResult<&[i64]> {
        let fields = self
            .fields
            .get_or_try_init(|| async {
                let names: Vec<Value> = ENT_FIELDS.iter().map(|(name, _)| Value::from(*name)).collect();
                let placeholders = vec!["?"; names.len()].join(",");
                let rows = self
                    .store
                    .get_records_select(
                        "user_info_field",
                        &format!("shortname IN ({})", placeholders),
                        &Params::Positional(names),
                        "id",
                        "id, shortname",
                    )
                    .await?;
                Ok::<_, IndicatorError>(group_fields(&rows))
            })
            .await?;
        Ok(fields.get(&archetype).map(Vec::as_slice).unwrap_or(&[]))
    }
}

fn group_fields(rows: &[Record]) -> HashMap<Archetype, Vec<i64>> {
    let mut fields: HashMap<Archetype, Vec<i64>> = HashMap::new();
    for row in rows {
        let (Some(id), Some(shortname)) = (row.get_i64("id"), row.get_str("shortname")) else {
            continue;
        };
        if let Some((_, archetype)) = ENT_FIELDS.iter().find(|(name, _)| *name == shortname) {
            fields.entry(*archetype).or_default().push(id);
        }
    }
    debug!("ent role policy fields: {:?}", fields);
    fields
}

#[async_trait]
impl RolePolicy for EntRolePolicy {
    async fn match_policy(&self, user_id: i64, archetype: Archetype) -> IndicatorResult<bool> {
        for field_id in self.field_ids(archetype).await? {
            let found = self
                .store
                .count_records(
                    "user_info_data",
                    &[("userid", Value::from(user_id)), ("fieldid", Value::from(*field_id))],
                )
                .await?;
            if found > 0 {
                trace!(user_id, %archetype, "ent role policy matched");
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn count_users(&self, archetype: Archetype) -> IndicatorResult<i64> {
        let field_ids = self.field_ids(archetype).await?;
        if field_ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "
            SELECT
                COUNT(DISTINCT uid.userid)
            FROM
                {{user_info_data}} uid,
                {{user}} u
            WHERE
                uid.userid = u.id AND
                u.deleted = 0 AND
                u.suspended = 0 AND
                uid.fieldid IN ({}) AND
                u.mnethostid = ?
            ",
            vec!["?"; field_ids.len()].join(",")
        );
        let mut params: Vec<Value> = field_ids.iter().map(|id| Value::from(*id)).collect();
        params.push(Value::from(self.mnet_localhost_id));
        self.store
            .count_records_sql(&sql, &Params::Positional(params))
            .await
    }
}

/// Builds the configured role policy.
pub fn policy_from_config(
    store: Arc<dyn DataStore>,
    config: &IndicatorsConfig,
) -> IndicatorResult<Arc<dyn RolePolicy>> {
    match config.role_policy.as_str() {
        "standard" => Ok(Arc::new(StandardRolePolicy::new(store, config))),
        "ent" => Ok(Arc::new(EntRolePolicy::new(store, config))),
        other => Err(IndicatorError::Config(format!(
            "Unknown role policy: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{store::Record, testing::StubStore};

    fn policy(store: StubStore) -> StandardRolePolicy {
        StandardRolePolicy::new(Arc::new(store), &IndicatorsConfig::default())
    }

    fn ras(pairs: &[(&str, i64)]) -> Vec<Record> {
        pairs
            .iter()
            .map(|(a, n)| Record::new().with("archetype", *a).with("ras", *n))
            .collect()
    }

    #[tokio::test]
    async fn site_admin_is_staff_only() {
        let p = policy(StubStore::new());
        assert!(p.match_policy(2, Archetype::Staff).await.unwrap());
        assert!(!p.match_policy(2, Archetype::Teacher).await.unwrap());
    }

    #[tokio::test]
    async fn manager_outranks_teacher_and_student() {
        let store = StubStore::new().on_records("{role_assignments}", ras(&[
            ("manager", 1),
            ("editingteacher", 3),
            ("student", 2),
        ]));
        let p = policy(store);
        assert!(p.match_policy(40, Archetype::Staff).await.unwrap());
        assert!(!p.match_policy(40, Archetype::Teacher).await.unwrap());
        assert!(!p.match_policy(40, Archetype::Student).await.unwrap());
    }

    #[tokio::test]
    async fn teacher_is_not_student() {
        let store = StubStore::new()
            .on_records("{role_assignments}", ras(&[("teacher", 1), ("student", 4)]));
        let p = policy(store);
        assert!(p.match_policy(41, Archetype::Teacher).await.unwrap());
        assert!(!p.match_policy(41, Archetype::Student).await.unwrap());
    }

    #[tokio::test]
    async fn plain_student() {
        let store = StubStore::new().on_records("{role_assignments}", ras(&[("student", 1)]));
        let p = policy(store);
        assert!(p.match_policy(42, Archetype::Student).await.unwrap());
        assert!(!p.match_policy(42, Archetype::Staff).await.unwrap());
    }

    #[tokio::test]
    async fn count_users_binds_local_host() {
        let store = StubStore::new().on_count("COUNT(DISTINCT ra.userid)", 17);
        let p = policy(store);
        assert_eq!(p.count_users(Archetype::Teacher).await.unwrap(), 17);
    }

    #[test]
    fn unknown_policy_is_config_error() {
        let cfg = IndicatorsConfig {
            role_policy: "ldap".into(),
            ..Default::default()
        };
        let err = policy_from_config(Arc::new(StubStore::new()), &cfg).err();
        assert!(matches!(err, Some(IndicatorError::Config(_))));
    }

    mod ent_tests {
        use super::*;

        fn fields() -> Vec<Record> {
            vec![
                Record::new().with("id", 11).with("shortname", "eleve"),
                Record::new().with("id", 12).with("shortname", "enseignant"),
                Record::new().with("id", 14).with("shortname", "cdt"),
            ]
        }

        fn ent(store: StubStore) -> (Arc<StubStore>, EntRolePolicy) {
            let store = Arc::new(store.on_records("{user_info_field}", fields()));
            let policy = EntRolePolicy::new(store.clone(), &IndicatorsConfig::default());
            (store, policy)
        }

        #[tokio::test]
        async fn cdt_holders_are_teachers() {
            let (store, p) = ent(StubStore::new().on_count("userid = 50 AND fieldid = 14", 1));
            assert!(p.match_policy(50, Archetype::Teacher).await.unwrap());
            assert!(!p.match_policy(50, Archetype::Student).await.unwrap());
            // field ids are resolved once
            assert_eq!(store.call_count("{user_info_field}"), 1);
        }

        #[tokio::test]
        async fn missing_staff_field_matches_and_counts_nobody() {
            let (store, p) = ent(StubStore::new().on_count("COUNT(DISTINCT uid.userid)", 99));
            assert!(!p.match_policy(50, Archetype::Staff).await.unwrap());
            assert_eq!(p.count_users(Archetype::Staff).await.unwrap(), 0);
            assert_eq!(store.call_count("COUNT(DISTINCT uid.userid)"), 0);
        }

        #[tokio::test]
        async fn teachers_are_counted_over_both_fields() {
            let (store, p) = ent(StubStore::new().on_count("COUNT(DISTINCT uid.userid)", 31));
            assert_eq!(p.count_users(Archetype::Teacher).await.unwrap(), 31);

            let (_, params) = store
                .calls()
                .into_iter()
                .find(|(sql, _)| sql.contains("uid.fieldid IN (?,?)"))
                .unwrap();
            assert_eq!(params, Params::positional([12, 14, 1]));
        }

        #[test]
        fn ent_is_selectable() {
            let cfg = IndicatorsConfig {
                role_policy: "ent".into(),
                ..Default::default()
            };
            assert!(policy_from_config(Arc::new(StubStore::new()), &cfg).is_ok());
        }
    }
}
