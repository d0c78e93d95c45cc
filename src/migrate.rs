//! State migration across schema versions.
//!
//! Stored state records carry the schema version they were written at.
//! Before a record is read, the dispatcher runs it through the resource's
//! [`Migrator`]: an ordered list of version-pinned upgraders, each a total,
//! idempotent function over the raw state map. Upgraders never chain
//! implicitly; the registry concatenates them explicitly and a failed
//! upgrade fails the whole operation as [`ServiceError::Fatal`].

use serde_json::Value;
use tracing::debug;

use crate::client::SessionInfo;
use crate::error::ServiceError;
use crate::ident::ObjectIdentifier;
use crate::state::RawState;

/// Context available to upgraders. Remote lookups are expensive, so only
/// the session identity (needed by the account-rename upgrader) is carried;
/// it is fetched lazily by the dispatcher when a registered upgrader
/// declares it needs one.
#[derive(Debug, Clone, Default)]
pub struct MigrationContext {
    /// The live session identity, when available.
    pub session: Option<SessionInfo>,
}

/// A version-pinned upgrade function over the raw state map.
pub type UpgradeFn = fn(RawState, &MigrationContext) -> Result<RawState, ServiceError>;

/// One registered upgrader.
#[derive(Debug, Clone)]
pub struct StateUpgrader {
    /// The source version this upgrader applies to.
    pub from_version: u64,
    /// The upgrade function; must be idempotent.
    pub apply: UpgradeFn,
    /// Whether the upgrader needs the live session identity.
    pub needs_session: bool,
}

/// The ordered upgrader registry for one resource kind.
#[derive(Debug, Clone, Default)]
pub struct Migrator {
    upgraders: Vec<StateUpgrader>,
}

impl Migrator {
    /// An empty migrator (records are already at the current version).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an upgrader for records at `from_version`.
    pub fn with_upgrader(mut self, from_version: u64, apply: UpgradeFn) -> Self {
        self.upgraders.push(StateUpgrader {
            from_version,
            apply,
            needs_session: false,
        });
        self.upgraders.sort_by_key(|u| u.from_version);
        self
    }

    /// Register an upgrader that needs the live session identity.
    pub fn with_session_upgrader(mut self, from_version: u64, apply: UpgradeFn) -> Self {
        self.upgraders.push(StateUpgrader {
            from_version,
            apply,
            needs_session: true,
        });
        self.upgraders.sort_by_key(|u| u.from_version);
        self
    }

    /// Whether upgrading a record from `from_version` to `target` needs
    /// the live session identity.
    pub fn needs_session(&self, from_version: u64, target: u64) -> bool {
        self.upgraders
            .iter()
            .any(|u| u.needs_session && u.from_version >= from_version && u.from_version < target)
    }

    /// Upgrade a raw record to `target`, applying every registered
    /// upgrader whose source version lies in `[record version, target)`.
    pub fn upgrade(
        &self,
        mut raw: RawState,
        target: u64,
        ctx: &MigrationContext,
    ) -> Result<RawState, ServiceError> {
        let mut version = raw
            .get("schema_version")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        for upgrader in &self.upgraders {
            if upgrader.from_version < version || upgrader.from_version >= target {
                continue;
            }
            debug!(
                from = upgrader.from_version,
                to = upgrader.from_version + 1,
                "upgrading state record"
            );
            raw = (upgrader.apply)(raw, ctx).map_err(|err| {
                ServiceError::Fatal(format!(
                    "state migration from v{} failed: {err}",
                    upgrader.from_version
                ))
            })?;
            version = upgrader.from_version + 1;
            raw.insert("schema_version".to_string(), Value::from(version));
        }
        if version < target {
            raw.insert("schema_version".to_string(), Value::from(target));
        }
        Ok(raw)
    }
}

/// v0 → v1 for argument-bearing kinds: stored identifiers gained an
/// explicit argument list; records written before that carry none. Appends
/// the literal empty `()` group; identifiers that already carry one are
/// left alone, which keeps the upgrader idempotent.
pub fn append_empty_arguments(
    mut raw: RawState,
    _ctx: &MigrationContext,
) -> Result<RawState, ServiceError> {
    let id = raw
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::Fatal("state record has no id field".to_string()))?;
    if !id.trim_end().ends_with(')') {
        let upgraded = format!("{id}()");
        raw.insert("id".to_string(), Value::from(upgraded));
    }
    Ok(raw)
}

/// Follow-up shape change: early records stored the dot-qualified name;
/// later versions store the pipe encoding. Parses whichever form is
/// present and writes back the pipe encoding.
pub fn reencode_qualified_identifier(
    mut raw: RawState,
    _ctx: &MigrationContext,
) -> Result<RawState, ServiceError> {
    let id = raw
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::Fatal("state record has no id field".to_string()))?;
    // Pipes only appear in the pipe encoding; dotted legacy forms never
    // contain one.
    let parsed = if id.contains('|') {
        ObjectIdentifier::from_state_encoding(id)?
    } else {
        ObjectIdentifier::parse(id)?
    };
    raw.insert("id".to_string(), Value::from(parsed.to_state_encoding()));
    Ok(raw)
}

/// Legacy account rename: records written against a renamed account still
/// carry the old locator. Rewrites the stored identifier to the canonical
/// two-part (organization, account) pair taken from the live session.
pub fn rewrite_account_identifier(
    mut raw: RawState,
    ctx: &MigrationContext,
) -> Result<RawState, ServiceError> {
    let session = ctx.session.as_ref().ok_or_else(|| {
        ServiceError::Fatal("account rename migration requires a live session".to_string())
    })?;
    let canonical =
        ObjectIdentifier::database(session.organization.clone(), session.account.clone());
    raw.insert(
        "id".to_string(),
        Value::from(canonical.to_state_encoding()),
    );
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_with_id(id: &str, version: u64) -> RawState {
        let mut raw = RawState::new();
        raw.insert("id".to_string(), json!(id));
        raw.insert("schema_version".to_string(), json!(version));
        raw
    }

    #[test]
    fn v0_to_v1_appends_the_empty_argument_list() {
        let raw = raw_with_id("DB.SCH.FN", 0);
        let ctx = MigrationContext::default();
        let upgraded = append_empty_arguments(raw, &ctx).unwrap();
        assert_eq!(upgraded.get("id"), Some(&json!("DB.SCH.FN()")));

        let id = ObjectIdentifier::parse("DB.SCH.FN()").unwrap();
        assert_eq!(id.arguments().unwrap().len(), 0);
    }

    #[test]
    fn v0_to_v1_is_idempotent() {
        let ctx = MigrationContext::default();
        let once = append_empty_arguments(raw_with_id("DB.SCH.FN", 0), &ctx).unwrap();
        let twice = append_empty_arguments(once.clone(), &ctx).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn reencode_converts_dotted_names_to_the_pipe_encoding() {
        let ctx = MigrationContext::default();
        let upgraded =
            reencode_qualified_identifier(raw_with_id("DB.SCH.FN()", 1), &ctx).unwrap();
        assert_eq!(upgraded.get("id"), Some(&json!("DB|SCH|FN|()")));

        // Already-encoded identifiers pass through unchanged.
        let again = reencode_qualified_identifier(upgraded.clone(), &ctx).unwrap();
        assert_eq!(again.get("id"), upgraded.get("id"));
    }

    #[test]
    fn migrator_runs_upgraders_in_version_order() {
        let migrator = Migrator::new()
            .with_upgrader(1, reencode_qualified_identifier)
            .with_upgrader(0, append_empty_arguments);
        let ctx = MigrationContext::default();

        let upgraded = migrator
            .upgrade(raw_with_id("DB.SCH.FN", 0), 2, &ctx)
            .unwrap();
        assert_eq!(upgraded.get("id"), Some(&json!("DB|SCH|FN|()")));
        assert_eq!(upgraded.get("schema_version"), Some(&json!(2)));
    }

    #[test]
    fn migrator_skips_upgraders_below_the_record_version() {
        let migrator = Migrator::new()
            .with_upgrader(0, append_empty_arguments)
            .with_upgrader(1, reencode_qualified_identifier);
        let ctx = MigrationContext::default();

        // A v1 record must not have the v0 upgrader applied again.
        let upgraded = migrator
            .upgrade(raw_with_id("DB.SCH.FN()", 1), 2, &ctx)
            .unwrap();
        assert_eq!(upgraded.get("id"), Some(&json!("DB|SCH|FN|()")));
    }

    #[test]
    fn account_rename_requires_a_session() {
        let err = rewrite_account_identifier(raw_with_id("OLDLOCATOR", 0), &MigrationContext::default())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Fatal(_)));

        let ctx = MigrationContext {
            session: Some(SessionInfo {
                organization: "MYORG".into(),
                account: "MYACCT".into(),
            }),
        };
        let upgraded = rewrite_account_identifier(raw_with_id("OLDLOCATOR", 0), &ctx).unwrap();
        assert_eq!(upgraded.get("id"), Some(&json!("MYORG|MYACCT")));
    }

    #[test]
    fn failed_upgrades_are_fatal() {
        let migrator = Migrator::new().with_upgrader(0, reencode_qualified_identifier);
        let ctx = MigrationContext::default();
        let mut raw = RawState::new();
        raw.insert("schema_version".to_string(), json!(0));
        let err = migrator.upgrade(raw, 1, &ctx).unwrap_err();
        assert!(matches!(err, ServiceError::Fatal(_)));
    }

    #[test]
    fn needs_session_inspects_the_applicable_range() {
        let migrator = Migrator::new()
            .with_upgrader(0, append_empty_arguments)
            .with_session_upgrader(1, rewrite_account_identifier);
        assert!(migrator.needs_session(0, 2));
        assert!(migrator.needs_session(1, 2));
        assert!(!migrator.needs_session(2, 2));
    }
}
