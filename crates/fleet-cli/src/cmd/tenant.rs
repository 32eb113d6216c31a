use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use fleet_core::{
    paths,
    registry::TenantRegistry,
    FleetError,
    types::{NewTenant, TenantConfig, TenantRef, TenantRole},
};
use std::path::Path;

#[derive(Subcommand)]
pub enum TenantSubcommand {
    /// Register a new tenant
    Add {
        /// Display name shown in logs and listings
        #[arg(long)]
        name: String,
        /// Platform credential; unique per tenant
        #[arg(long)]
        token: String,
        /// Link used when no play URL is set
        #[arg(long)]
        registration_link: String,
        /// Channel to post in (@name, t.me link or numeric id)
        #[arg(long)]
        channel: Option<String>,
        #[arg(long)]
        play_url: Option<String>,
        /// guide or channel-signal
        #[arg(long, default_value = "channel-signal")]
        role: TenantRole,
        /// Operator who registered the tenant
        #[arg(long)]
        created_by: Option<i64>,
    },
    /// List registered tenants
    List {
        #[arg(long)]
        role: Option<TenantRole>,
        /// Only active tenants
        #[arg(long)]
        active: bool,
    },
    /// Show one tenant
    Show {
        /// Token or numeric id
        tenant: String,
    },
    /// Remove a tenant
    Remove {
        /// Token or numeric id
        tenant: String,
    },
    /// Flip a tenant between active and inactive
    Toggle { tenant: String },
    /// Set the link signals point at (empty clears it)
    SetPlayUrl { tenant: String, url: String },
}

pub fn run(root: &Path, subcmd: TenantSubcommand, json: bool) -> anyhow::Result<()> {
    let registry =
        TenantRegistry::open(&paths::registry_path(root)).context("failed to open registry")?;
    match subcmd {
        TenantSubcommand::Add {
            name,
            token,
            registration_link,
            channel,
            play_url,
            role,
            created_by,
        } => {
            let new = NewTenant {
                display_name: name,
                token,
                registration_link,
                channel_link: channel,
                play_url,
                role,
                created_by,
            };
            add(&registry, new, json)
        }
        TenantSubcommand::List { role, active } => list(&registry, role, active, json),
        TenantSubcommand::Show { tenant } => show(&registry, &tenant, json),
        TenantSubcommand::Remove { tenant } => remove(&registry, &tenant, json),
        TenantSubcommand::Toggle { tenant } => toggle(&registry, &tenant, json),
        TenantSubcommand::SetPlayUrl { tenant, url } => set_play_url(&registry, &tenant, &url, json),
    }
}

fn add(registry: &TenantRegistry, new: NewTenant, json: bool) -> anyhow::Result<()> {
    let tenant = registry
        .create_tenant(new)
        .context("failed to register tenant")?;
    if json {
        print_json(&tenant)?;
    } else {
        println!("Registered tenant #{}: {}", tenant.id, tenant.display_name);
        match &tenant.target_channel {
            Some(channel) => println!("Channel: {channel}"),
            None => println!("No channel set; the tenant will not be started."),
        }
    }
    Ok(())
}

fn list(
    registry: &TenantRegistry,
    role: Option<TenantRole>,
    active_only: bool,
    json: bool,
) -> anyhow::Result<()> {
    let tenants: Vec<TenantConfig> = if active_only {
        registry.get_active_tenants(role)?
    } else {
        registry
            .list_tenants()?
            .into_iter()
            .filter(|t| role.map_or(true, |r| t.role == r))
            .collect()
    };

    if json {
        let summaries: Vec<_> = tenants
            .iter()
            .map(|t| {
                serde_json::json!({
                    "id": t.id,
                    "display_name": t.display_name,
                    "role": t.role,
                    "channel": t.target_channel,
                    "active": t.is_active,
                })
            })
            .collect();
        return print_json(&summaries);
    }

    if tenants.is_empty() {
        println!("No tenants registered.");
        return Ok(());
    }
    let rows = tenants
        .iter()
        .map(|t| {
            vec![
                t.id.to_string(),
                t.display_name.clone(),
                t.role.to_string(),
                t.target_channel.clone().unwrap_or_else(|| "-".into()),
                if t.is_active { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "ROLE", "CHANNEL", "ACTIVE"], rows);
    Ok(())
}

fn find(registry: &TenantRegistry, raw: &str) -> anyhow::Result<TenantConfig> {
    registry
        .get(&TenantRef::parse(raw))?
        .ok_or_else(|| FleetError::TenantNotFound(raw.to_string()).into())
}

fn show(registry: &TenantRegistry, raw: &str, json: bool) -> anyhow::Result<()> {
    let t = find(registry, raw)?;
    if json {
        return print_json(&t);
    }
    println!("Tenant #{}: {}", t.id, t.display_name);
    println!("Role:         {}", t.role);
    println!("Active:       {}", t.is_active);
    println!(
        "Channel:      {}",
        t.target_channel.as_deref().unwrap_or("-")
    );
    println!("Registration: {}", t.registration_link);
    println!("Play URL:     {}", t.play_url.as_deref().unwrap_or("-"));
    println!("Signal link:  {}", t.signal_link());
    println!("Cached media: {}", t.cached_media.len());
    println!("Created:      {}", t.created_at.format("%Y-%m-%d %H:%M UTC"));
    Ok(())
}

fn remove(registry: &TenantRegistry, raw: &str, json: bool) -> anyhow::Result<()> {
    let removed = registry.delete_tenant(&TenantRef::parse(raw))?;
    if !removed {
        return Err(FleetError::TenantNotFound(raw.to_string()).into());
    }
    if json {
        print_json(&serde_json::json!({ "removed": raw }))?;
    } else {
        println!("Removed tenant {raw}");
    }
    Ok(())
}

fn toggle(registry: &TenantRegistry, raw: &str, json: bool) -> anyhow::Result<()> {
    let t = find(registry, raw)?;
    let active = registry
        .toggle_active(&t.token)?
        .ok_or_else(|| FleetError::TenantNotFound(raw.to_string()))?;
    if json {
        print_json(&serde_json::json!({ "id": t.id, "active": active }))?;
    } else {
        let state = if active { "active" } else { "inactive" };
        println!("Tenant #{} is now {state}", t.id);
    }
    Ok(())
}

fn set_play_url(registry: &TenantRegistry, raw: &str, url: &str, json: bool) -> anyhow::Result<()> {
    let t = find(registry, raw)?;
    registry.update_play_url(&t.token, url)?;
    let updated = find(registry, &t.token)?;
    if json {
        print_json(&updated)?;
    } else {
        println!("Signal link for #{}: {}", updated.id, updated.signal_link());
    }
    Ok(())
}
