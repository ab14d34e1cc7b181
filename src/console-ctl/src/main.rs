//! Console operator CLI — inspect the module registry, exercise navigation
//! for a given role, trigger reconciliation, and query the audit trail
//! against an in-memory demo shell.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use console_audit::{AuditFilter, AuditLog, MemorySink};
use console_core::types::{Actor, Role};
use console_core::ConsoleConfig;
use console_registry::ModuleRegistry;
use console_shell::{FailingModule, ModuleHost, Router, Session, StubModule};
use console_stats::{collect, CountSource};
use console_sync::Reconciler;

#[derive(Parser)]
#[command(name = "console-ctl")]
#[command(about = "Admin console shell operator tool")]
#[command(version)]
struct Cli {
    /// Role to run the session as
    #[arg(long, global = true, default_value = "admin")]
    role: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the module registry with status and visibility for the role
    Modules,

    /// Navigate to a module and print the resulting state and audit trail
    Navigate {
        /// Target module id
        module: String,
    },

    /// Trigger a reconciliation pass (requires the "all" capability)
    ForceReconcile {
        /// Register this module with a failing instantiation check
        #[arg(long)]
        broken: Option<String>,
    },

    /// Replay a short demo session and print its audit trail
    Audit {
        /// Filter by module id
        #[arg(long)]
        module: Option<String>,

        /// Filter by action (navigated, denied, ...)
        #[arg(long)]
        action: Option<String>,

        /// Maximum entries to print
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Collect dashboard counts across the demo modules
    Stats {
        /// Simulate these sources failing (comma-separated module ids)
        #[arg(long, value_delimiter = ',')]
        fail: Vec<String>,
    },
}

/// In-memory shell wiring shared by every subcommand.
struct Shell {
    registry: Arc<ModuleRegistry>,
    host: Arc<ModuleHost>,
    audit: Arc<AuditLog>,
    reconciler: Reconciler,
    config: ConsoleConfig,
}

impl Shell {
    fn build(config: ConsoleConfig, broken: Option<&str>) -> Self {
        let registry = Arc::new(ModuleRegistry::builtin());
        let host = Arc::new(ModuleHost::new());

        // Compile-time set of the demo build: everything in the manifest
        // except "legacy", which exists only as a declared entry.
        for descriptor in registry.list() {
            if descriptor.id == "legacy" {
                continue;
            }
            if broken == Some(descriptor.id.as_str()) {
                host.register(FailingModule::new(descriptor.id, "simulated failure"));
            } else {
                host.register(StubModule::new(descriptor.id));
            }
        }

        let audit = Arc::new(AuditLog::new(
            Arc::new(MemorySink::new()),
            config.audit.buffer_capacity,
        ));
        let reconciler = Reconciler::new(
            Arc::clone(&registry),
            Arc::clone(&host),
            Duration::from_millis(config.sync.module_probe_timeout_ms),
            config.sync.report_history,
        );

        Self {
            registry,
            host,
            audit,
            reconciler,
            config,
        }
    }

    fn router(&self, session: Session) -> Router {
        Router::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.audit),
            session,
            self.config.default_module.clone(),
        )
    }
}

fn session_for(role_name: &str) -> Result<Session> {
    let role = Role::parse(role_name)
        .ok_or_else(|| anyhow::anyhow!("unknown role '{role_name}' (try admin, super_admin, moderator, editor, user)"))?;
    Ok(Session::sign_in(Actor::new(role)))
}

fn print_trail(audit: &AuditLog, filter: &AuditFilter) {
    for entry in audit.query(filter) {
        println!(
            "  #{:<4} {}  {:<12} {:<10} {}",
            entry.sequence,
            entry.timestamp.format("%H:%M:%S"),
            entry.module_id,
            entry.action,
            entry.detail
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let config = ConsoleConfig::load().unwrap_or_default();
    let session = session_for(&cli.role)?;

    match cli.command {
        Commands::Modules => {
            let shell = Shell::build(config, None);
            shell.reconciler.reconcile().await;
            let router = shell.router(session);
            let visible: Vec<String> = router
                .visible_modules()
                .into_iter()
                .map(|m| m.id)
                .collect();

            println!(
                "{:<14} {:<22} {:<9} {:<10} {:<10} visible",
                "ID", "NAME", "VERSION", "STATUS", "CAPABILITY"
            );
            for m in shell.registry.list() {
                println!(
                    "{:<14} {:<22} {:<9} {:<10} {:<10} {}",
                    m.id,
                    m.display_name,
                    m.version,
                    format!("{:?}", m.status).to_lowercase(),
                    m.required_capability,
                    if visible.contains(&m.id) { "yes" } else { "no" }
                );
            }
        }

        Commands::Navigate { module } => {
            let shell = Shell::build(config, None);
            let router = shell.router(session);
            router.restore(None);

            match router.navigate(&module) {
                Ok(()) => println!(
                    "active module: {}  locator: {}",
                    router.active_module().unwrap_or_default(),
                    router.locator().unwrap_or_default()
                ),
                Err(e) => println!(
                    "navigation rejected: {e}\nactive module unchanged: {}",
                    router.active_module().unwrap_or_else(|| "<none>".into())
                ),
            }
            println!("session audit trail:");
            print_trail(&shell.audit, &AuditFilter::default());
        }

        Commands::ForceReconcile { broken } => {
            let shell = Shell::build(config, broken.as_deref());
            let report = shell
                .reconciler
                .force_reconcile(&session.capabilities)
                .await?;
            shell.audit.append(
                session.actor.id,
                "auto-sync",
                "force-reconcile",
                serde_json::json!({"conflicts": report.conflicts.len()}),
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Audit {
            module,
            action,
            limit,
        } => {
            let shell = Shell::build(config, None);
            let router = shell.router(session);
            // Scripted demo session so the trail has content.
            router.restore(None);
            for target in ["users", "billing", "polls", "no-such-module"] {
                let _ = router.navigate(target);
            }
            println!("audit trail ({} committed entries):", shell.audit.len());
            print_trail(
                &shell.audit,
                &AuditFilter {
                    module_id: module,
                    action,
                    limit,
                    ..Default::default()
                },
            );
            let chain = shell.audit.verify_chain();
            println!(
                "chain: {}/{} valid, intact={}",
                chain.valid_entries, chain.total_entries, chain.chain_intact
            );
        }

        Commands::Stats { fail } => {
            let shell = Shell::build(config, None);
            let timeout = Duration::from_millis(shell.config.stats.source_timeout_ms);
            let sources: Vec<CountSource> = shell
                .host
                .ids()
                .into_iter()
                .map(|id| {
                    let failing = fail.contains(&id);
                    let simulated = (id.len() as u64) * 17 % 97;
                    CountSource::new(id, timeout, async move {
                        if failing {
                            anyhow::bail!("source offline")
                        }
                        Ok(simulated)
                    })
                })
                .collect();

            let stats = collect(sources).await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
