//! Idempotent bootstrap seed.
//!
//! Creates whatever of the baseline is missing: the default organization, the
//! permission keys, the built-in roles and their grants, a starter category
//! and the administrator. Running it again against a seeded store changes
//! nothing and reports [`SeedOutcome::AlreadySeeded`].

use anyhow::Context;
use chrono::Utc;

use scholar_auth::identity::normalize_email;
use scholar_auth::password::hash_password;
use scholar_auth::permissions::keys;
use scholar_auth::{Organization, PermissionKey, PermissionRecord, RoleKey, RoleRecord, User};
use scholar_core::{OrganizationId, PageRequest, PermissionId, RoleId};
use scholar_courses::Category;

use crate::config::AdminSeed;
use crate::store::Store;

const DEFAULT_ORGANIZATION: &str = "Default Organization";
const STARTER_CATEGORY: &str = "General";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// At least one record was created.
    Seeded { created: usize },
    AlreadySeeded,
}

struct BuiltinRole {
    key: RoleKey,
    name: &'static str,
    description: &'static str,
    assigned_on_sign_up: bool,
    grants: &'static [PermissionKey],
}

fn builtin_roles() -> Vec<BuiltinRole> {
    const NO_GRANTS: &[PermissionKey] = &[];
    const TEACHER_GRANTS: &[PermissionKey] = &[keys::WRITE_COURSES];
    vec![
        BuiltinRole {
            key: RoleKey::SUPER_ADMIN,
            name: "Super Admin",
            description: "Holds every permission",
            assigned_on_sign_up: false,
            grants: NO_GRANTS,
        },
        BuiltinRole {
            key: RoleKey::TEACHER,
            name: "Teacher",
            description: "Creates and manages courses",
            assigned_on_sign_up: false,
            grants: TEACHER_GRANTS,
        },
        BuiltinRole {
            key: RoleKey::STUDENT,
            name: "Student",
            description: "Joins courses and takes tests",
            assigned_on_sign_up: true,
            grants: NO_GRANTS,
        },
    ]
}

/// Seed `store`, creating only what is missing.
pub async fn seed(store: &dyn Store, admin: &AdminSeed) -> anyhow::Result<SeedOutcome> {
    let now = Utc::now();
    let mut created = 0usize;

    let organization = match store
        .default_organization()
        .await
        .context("load default organization")?
    {
        Some(org) => org,
        None => {
            let org = Organization {
                id: OrganizationId::new(),
                name: DEFAULT_ORGANIZATION.to_string(),
                is_default: true,
                created_at: now,
            };
            store
                .insert_organization(&org)
                .await
                .context("create default organization")?;
            created += 1;
            org
        }
    };

    let mut all_permissions: Vec<PermissionId> = Vec::with_capacity(keys::ALL.len());
    for (key, name) in keys::ALL {
        let id = match store.permission_by_key(key).await? {
            Some(existing) => existing.id,
            None => {
                let record = PermissionRecord {
                    id: PermissionId::new(),
                    name: (*name).to_string(),
                    key: key.clone(),
                    description: None,
                    created_at: now,
                };
                store
                    .insert_permission(&record)
                    .await
                    .with_context(|| format!("create permission {key}"))?;
                created += 1;
                record.id
            }
        };
        all_permissions.push(id);
    }

    let mut super_admin: Option<RoleId> = None;
    for builtin in builtin_roles() {
        let role_id = match store.role_by_key(&builtin.key).await? {
            Some(existing) => existing.id,
            None => {
                let role = RoleRecord {
                    id: RoleId::new(),
                    name: builtin.name.to_string(),
                    key: builtin.key.clone(),
                    description: Some(builtin.description.to_string()),
                    assigned_on_sign_up: builtin.assigned_on_sign_up,
                    created_at: now,
                };
                store
                    .insert_role(&role)
                    .await
                    .with_context(|| format!("create role {}", builtin.key))?;
                created += 1;
                role.id
            }
        };

        // Grants are idempotent inserts, so re-running them is harmless.
        if builtin.key == RoleKey::SUPER_ADMIN {
            super_admin = Some(role_id);
            for permission in &all_permissions {
                store.grant_permission(role_id, *permission).await?;
            }
        } else {
            for key in builtin.grants {
                if let Some(permission) = store.permission_by_key(key).await? {
                    store.grant_permission(role_id, permission.id).await?;
                }
            }
        }
    }

    let categories = store
        .list_categories(&PageRequest::new(1, 1))
        .await
        .context("list categories")?;
    if categories.total_count == 0 {
        let category = Category::new(STARTER_CATEGORY)?;
        store
            .insert_category(&category)
            .await
            .context("create starter category")?;
        created += 1;
    }

    let email = normalize_email(&admin.email)?;
    if store.user_by_email(&email).await?.is_none() {
        let mut user = User::new(
            admin.name.clone(),
            &email,
            Some(hash_password(&admin.password)?),
            now,
        )?;
        user.is_email_verified = true;
        let roles: Vec<RoleId> = super_admin.into_iter().collect();
        store
            .register_user(&user, organization.id, &roles)
            .await
            .context("create admin user")?;
        created += 1;
        tracing::info!(email = %email, "administrator created");
    }

    if created == 0 {
        tracing::info!("seed: nothing to do");
        Ok(SeedOutcome::AlreadySeeded)
    } else {
        tracing::info!(created, "seed complete");
        Ok(SeedOutcome::Seeded { created })
    }
}
