//! User, role and permission CLI commands.

use anyhow::Result;
use comfy_table::{Cell, Color};
use console::style;

use signoff_types::directory::{CreatePermissionRequest, CreateRoleRequest, CreateUserRequest};

use crate::cli::{PermissionCommand, RoleCommand, UserCommand, new_table, print_success};
use crate::state::AppState;

pub async fn handle_user(state: &AppState, action: UserCommand, json: bool) -> Result<()> {
    match action {
        UserCommand::Create {
            username,
            full_name,
            roles,
        } => {
            let user = state
                .directory
                .create_user(CreateUserRequest {
                    username,
                    full_name,
                    role_names: roles,
                })
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&user)?);
            } else {
                print_success(&format!("User '{}' created ({})", user.username, user.id));
            }
        }
        UserCommand::List => {
            let users = state.directory.list_users().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&users)?);
                return Ok(());
            }
            let roles = state.directory.list_roles().await?;
            let mut table = new_table(&["Username", "Name", "Roles", "Active", "ID"]);
            for user in &users {
                let role_names: Vec<&str> = roles
                    .iter()
                    .filter(|r| user.role_ids.contains(&r.id))
                    .map(|r| r.name.as_str())
                    .collect();
                table.add_row(vec![
                    Cell::new(&user.username).fg(Color::Cyan),
                    Cell::new(&user.full_name),
                    Cell::new(role_names.join(", ")),
                    if user.is_active {
                        Cell::new("yes").fg(Color::Green)
                    } else {
                        Cell::new("no").fg(Color::Yellow)
                    },
                    Cell::new(user.id.to_string()).fg(Color::DarkGrey),
                ]);
            }
            println!();
            println!("{table}");
            println!();
        }
        UserCommand::Token { username, label } => {
            let token = state.directory.issue_token(&username, &label).await?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "username": username,
                        "token": token,
                    }))?
                );
            } else {
                println!();
                println!(
                    "  {} API token for '{}' (save this -- it won't be shown again):",
                    style("🔑").bold(),
                    username
                );
                println!();
                println!("  {}", style(&token).yellow().bold());
                println!();
            }
        }
        UserCommand::Assign { username, role } => {
            state.directory.assign_role(&username, &role).await?;
            if !json {
                print_success(&format!("Role '{role}' assigned to '{username}'"));
            }
        }
    }
    Ok(())
}

pub async fn handle_role(state: &AppState, action: RoleCommand, json: bool) -> Result<()> {
    match action {
        RoleCommand::Create {
            name,
            description,
            permissions,
        } => {
            let role = state
                .directory
                .create_role(CreateRoleRequest {
                    name,
                    description,
                    permission_names: permissions,
                })
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&role)?);
            } else {
                print_success(&format!("Role '{}' created ({})", role.name, role.id));
            }
        }
        RoleCommand::List => {
            let roles = state.directory.list_roles().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&roles)?);
                return Ok(());
            }
            let permissions = state.directory.list_permissions().await?;
            let mut table = new_table(&["Name", "Permissions", "Description", "ID"]);
            for role in &roles {
                let granted: Vec<&str> = permissions
                    .iter()
                    .filter(|p| role.permission_ids.contains(&p.id))
                    .map(|p| p.name.as_str())
                    .collect();
                table.add_row(vec![
                    Cell::new(&role.name).fg(Color::Cyan),
                    Cell::new(granted.join(", ")),
                    Cell::new(role.description.as_deref().unwrap_or("")),
                    Cell::new(role.id.to_string()).fg(Color::DarkGrey),
                ]);
            }
            println!();
            println!("{table}");
            println!();
        }
        RoleCommand::Grant { role, permission } => {
            state.directory.grant_permission(&role, &permission).await?;
            if !json {
                print_success(&format!("Granted '{permission}' to role '{role}'"));
            }
        }
    }
    Ok(())
}

pub async fn handle_permission(
    state: &AppState,
    action: PermissionCommand,
    json: bool,
) -> Result<()> {
    match action {
        PermissionCommand::Create {
            name,
            resource,
            action,
            description,
        } => {
            let permission = state
                .directory
                .create_permission(CreatePermissionRequest {
                    name,
                    resource,
                    action,
                    description,
                })
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&permission)?);
            } else {
                print_success(&format!(
                    "Permission '{}' created ({})",
                    permission.name, permission.id
                ));
            }
        }
        PermissionCommand::List => {
            let permissions = state.directory.list_permissions().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&permissions)?);
                return Ok(());
            }
            let mut table = new_table(&["Name", "Resource", "Action", "ID"]);
            for p in &permissions {
                table.add_row(vec![
                    Cell::new(&p.name).fg(Color::Cyan),
                    Cell::new(&p.resource),
                    Cell::new(&p.action),
                    Cell::new(p.id.to_string()).fg(Color::DarkGrey),
                ]);
            }
            println!();
            println!("{table}");
            println!();
        }
    }
    Ok(())
}
