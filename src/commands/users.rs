use crate::args::AddUserArgs;
use crate::commands::{authorize, Out};
use crate::error::{ErrorType, IntoResult};
use crate::model::{Permission, Role, User, UserStatus};
use crate::{Config, Error, Result};

/// Adds a user. Requires `ManageUsers`.
pub async fn add_user(config: Config, actor: &str, args: AddUserArgs) -> Result<Out<User>> {
    let me = authorize(&config, actor, Permission::ManageUsers).await?;
    let branch_id = match &args.branch {
        Some(key) => Some(
            config
                .db()
                .require_branch(key)
                .await
                .pub_result(ErrorType::Database)?
                .id,
        ),
        None => None,
    };
    let user = config
        .db()
        .add_user(
            &me.email,
            &args.email,
            &args.name,
            args.role,
            branch_id.as_deref(),
        )
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(
        format!("Added {} ({}) as {}", user.name, user.email, user.role),
        user,
    ))
}

pub async fn list_users(config: Config, actor: &str) -> Result<Out<Vec<User>>> {
    authorize(&config, actor, Permission::ManageUsers).await?;
    let users = config
        .db()
        .list_users()
        .await
        .pub_result(ErrorType::Database)?;
    let mut message = format!("{} user{}", users.len(), crate::utils::plural(users.len()));
    for u in &users {
        message.push_str(&format!("\n  {} <{}> {} ({})", u.name, u.email, u.role, u.status));
    }
    Ok(Out::new(message, users))
}

/// Changes a user's role. An administrator cannot demote themself.
pub async fn set_user_role(
    config: Config,
    actor: &str,
    email: &str,
    role: Role,
) -> Result<Out<User>> {
    let me = authorize(&config, actor, Permission::ManageUsers).await?;
    if is_self(&me, email) && role != Role::Admin {
        return Err(Error::msg(
            ErrorType::Validation,
            "You cannot remove your own administrator role",
        ));
    }
    let user = config
        .db()
        .set_user_role(&me.email, email, role)
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(format!("{} is now {}", user.email, user.role), user))
}

/// Activates or deactivates a user. An administrator cannot deactivate themself.
pub async fn set_user_status(
    config: Config,
    actor: &str,
    email: &str,
    status: UserStatus,
) -> Result<Out<User>> {
    let me = authorize(&config, actor, Permission::ManageUsers).await?;
    if is_self(&me, email) && status == UserStatus::Inactive {
        return Err(Error::msg(
            ErrorType::Validation,
            "You cannot deactivate yourself",
        ));
    }
    let user = config
        .db()
        .set_user_status(&me.email, email, status)
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(format!("{} is now {}", user.email, user.status), user))
}

pub async fn remove_user(config: Config, actor: &str, email: &str) -> Result<Out<()>> {
    let me = authorize(&config, actor, Permission::ManageUsers).await?;
    if is_self(&me, email) {
        return Err(Error::msg(
            ErrorType::Validation,
            "You cannot remove yourself",
        ));
    }
    config
        .db()
        .remove_user(&me.email, email)
        .await
        .pub_result(ErrorType::Database)?;
    Ok(format!("Removed {}", email.trim()).into())
}

fn is_self(me: &User, email: &str) -> bool {
    me.email.eq_ignore_ascii_case(email.trim())
}
