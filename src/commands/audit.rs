use crate::commands::{authorize, Out};
use crate::db::AuditQuery;
use crate::error::{ErrorType, IntoResult};
use crate::model::{AuditEntry, Permission};
use crate::{Config, Result};

/// Audit entries, newest first. `actor_filter` and `entity` match case-insensitively.
pub async fn list_audit(
    config: Config,
    actor: &str,
    actor_filter: Option<&str>,
    entity: Option<&str>,
    limit: i64,
) -> Result<Out<Vec<AuditEntry>>> {
    authorize(&config, actor, Permission::ViewAudit).await?;
    let query = AuditQuery {
        actor: actor_filter.map(String::from),
        entity: entity.map(String::from),
        limit,
    };
    let entries = config
        .db()
        .list_audit(&query)
        .await
        .pub_result(ErrorType::Database)?;
    let mut message = format!(
        "{} audit entr{}",
        entries.len(),
        if entries.len() == 1 { "y" } else { "ies" }
    );
    for e in &entries {
        message.push_str(&format!(
            "\n  {} {} {} {} {} {}",
            e.timestamp, e.actor, e.action, e.entity, e.entity_id, e.details
        ));
    }
    Ok(Out::new(message, entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestEnv;

    #[tokio::test]
    async fn test_list_audit() {
        let env = TestEnv::new().await;
        let out = list_audit(env.config(), TestEnv::BISHOP, None, Some("Account"), 50)
            .await
            .unwrap();
        let entries = out.structure().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.entity == "account"));

        let out = list_audit(env.config(), TestEnv::ADMIN, Some(TestEnv::ADMIN), None, 3)
            .await
            .unwrap();
        assert_eq!(out.structure().unwrap().len(), 3);

        let err = list_audit(env.config(), TestEnv::FINANCE, None, None, 50)
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Permission);
    }
}
