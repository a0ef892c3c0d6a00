//! Branch and ministry handlers. Mutations require `ManageBranches`; listing only needs
//! `ViewFinances`.

use crate::commands::{authorize, Out};
use crate::error::{ErrorType, IntoResult};
use crate::model::{Branch, Ministry, Permission};
use crate::utils::plural;
use crate::{Config, Result};

pub async fn add_branch(
    config: Config,
    actor: &str,
    name: &str,
    location: &str,
) -> Result<Out<Branch>> {
    let me = authorize(&config, actor, Permission::ManageBranches).await?;
    let branch = config
        .db()
        .add_branch(&me.email, name, location)
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(format!("Added branch {}", branch.name), branch))
}

pub async fn list_branches(config: Config, actor: &str) -> Result<Out<Vec<Branch>>> {
    authorize(&config, actor, Permission::ViewFinances).await?;
    let branches = config
        .db()
        .list_branches()
        .await
        .pub_result(ErrorType::Database)?;
    let mut message = format!("{} branch{}", branches.len(), es(branches.len()));
    for b in &branches {
        message.push_str(&format!("\n  {} ({}) {}", b.name, b.id, b.location));
    }
    Ok(Out::new(message, branches))
}

/// Renames and/or relocates a branch. `branch` is an id or a name.
pub async fn update_branch(
    config: Config,
    actor: &str,
    branch: &str,
    name: Option<&str>,
    location: Option<&str>,
) -> Result<Out<Branch>> {
    let me = authorize(&config, actor, Permission::ManageBranches).await?;
    let branch = config
        .db()
        .update_branch(&me.email, branch, name, location)
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(format!("Updated branch {}", branch.name), branch))
}

/// Deletes a branch and its ministries. Fails while the branch still owns accounts or
/// transactions.
pub async fn remove_branch(config: Config, actor: &str, branch: &str) -> Result<Out<Branch>> {
    let me = authorize(&config, actor, Permission::ManageBranches).await?;
    let branch = config
        .db()
        .remove_branch(&me.email, branch)
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(format!("Removed branch {}", branch.name), branch))
}

pub async fn add_ministry(
    config: Config,
    actor: &str,
    branch: &str,
    name: &str,
    description: &str,
) -> Result<Out<Ministry>> {
    let me = authorize(&config, actor, Permission::ManageBranches).await?;
    let db = config.db();
    let branch = db
        .require_branch(branch)
        .await
        .pub_result(ErrorType::Database)?;
    let ministry = db
        .add_ministry(&me.email, &branch.id, name, description)
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(
        format!("Added ministry {} to {}", ministry.name, branch.name),
        ministry,
    ))
}

pub async fn list_ministries(
    config: Config,
    actor: &str,
    branch: Option<&str>,
) -> Result<Out<Vec<Ministry>>> {
    authorize(&config, actor, Permission::ViewFinances).await?;
    let db = config.db();
    let branch_id = match branch {
        Some(key) => Some(
            db.require_branch(key)
                .await
                .pub_result(ErrorType::Database)?
                .id,
        ),
        None => None,
    };
    let ministries = db
        .list_ministries(branch_id.as_deref())
        .await
        .pub_result(ErrorType::Database)?;
    let mut message = format!("{} ministr{}", ministries.len(), ies(ministries.len()));
    for m in &ministries {
        message.push_str(&format!("\n  {} ({})", m.name, m.id));
    }
    Ok(Out::new(message, ministries))
}

pub async fn remove_ministry(config: Config, actor: &str, id: &str) -> Result<Out<()>> {
    let me = authorize(&config, actor, Permission::ManageBranches).await?;
    config
        .db()
        .remove_ministry(&me.email, id)
        .await
        .pub_result(ErrorType::Database)?;
    Ok(format!("Removed ministry {id}").into())
}

fn es(count: usize) -> &'static str {
    if plural(count).is_empty() {
        ""
    } else {
        "es"
    }
}

fn ies(count: usize) -> &'static str {
    if plural(count).is_empty() {
        "y"
    } else {
        "ies"
    }
}
