//! Navigation state machine. Every transition re-validates module existence
//! and actor capability before committing, so the active module id can
//! never point at an unknown or forbidden module.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use console_audit::AuditLog;
use console_core::types::{Actor, CapabilitySet, ModuleDescriptor, ModuleStatus};
use console_core::{ConsoleError, ConsoleResult};
use console_registry::ModuleRegistry;

/// Per-session authentication context: the actor plus the capability set
/// resolved once at sign-in. Destroyed at sign-out.
#[derive(Debug, Clone)]
pub struct Session {
    pub actor: Actor,
    pub capabilities: CapabilitySet,
}

impl Session {
    /// Resolve the actor's capabilities once for the session lifetime.
    pub fn sign_in(actor: Actor) -> Self {
        let capabilities = console_access::resolve(actor.role);
        info!(actor_id = %actor.id, role = actor.role.as_str(), "session started");
        Self {
            actor,
            capabilities,
        }
    }
}

/// Router states. `Navigating` is transient: `navigate` passes through it
/// and always settles on `Active` or `Denied` before returning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterState {
    Idle,
    Navigating,
    Active(String),
    Denied(String),
}

struct NavigationState {
    state: RouterState,
    /// Last successfully committed module id. Unchanged by denials.
    active_module: Option<String>,
    /// Shareable external locator, e.g. a URL query string.
    locator: Option<String>,
}

/// The module router: filters the visible module list and gates every
/// navigation request through the permission resolver.
pub struct Router {
    registry: Arc<ModuleRegistry>,
    audit: Arc<AuditLog>,
    session: Session,
    default_module: String,
    nav: Mutex<NavigationState>,
}

impl Router {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        audit: Arc<AuditLog>,
        session: Session,
        default_module: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            audit,
            session,
            default_module: default_module.into(),
            nav: Mutex::new(NavigationState {
                state: RouterState::Idle,
                active_module: None,
                locator: None,
            }),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> RouterState {
        self.nav.lock().state.clone()
    }

    pub fn active_module(&self) -> Option<String> {
        self.nav.lock().active_module.clone()
    }

    pub fn locator(&self) -> Option<String> {
        self.nav.lock().locator.clone()
    }

    /// Navigate to a module. Synchronous and idempotent: re-navigating to
    /// the active module still refreshes the locator and appends exactly
    /// one audit entry.
    pub fn navigate(&self, target: &str) -> ConsoleResult<()> {
        let mut nav = self.nav.lock();
        let prior_state = std::mem::replace(&mut nav.state, RouterState::Navigating);

        let descriptor = match self.registry.get(target) {
            Some(d) => d,
            None => {
                // Unknown id: restore the state exactly as it was before
                // the attempt, denials included.
                nav.state = prior_state;
                drop(nav);
                warn!(module_id = %target, "navigation rejected: unknown module");
                self.audit.append(
                    self.session.actor.id,
                    target,
                    "denied",
                    serde_json::json!({"reason": "unknown module"}),
                );
                return Err(ConsoleError::ModuleNotFound(target.to_string()));
            }
        };

        if !self.session.capabilities.allows(&descriptor.required_capability) {
            nav.state = RouterState::Denied(target.to_string());
            drop(nav);
            warn!(
                module_id = %target,
                required = %descriptor.required_capability,
                "navigation denied"
            );
            self.audit.append(
                self.session.actor.id,
                target,
                "denied",
                serde_json::json!({"required": descriptor.required_capability}),
            );
            return Err(ConsoleError::PermissionDenied {
                module: target.to_string(),
                required: descriptor.required_capability,
            });
        }

        nav.state = RouterState::Active(target.to_string());
        nav.active_module = Some(target.to_string());
        nav.locator = Some(format!("?module={target}"));
        drop(nav);

        info!(module_id = %target, "navigated");
        self.audit.append(
            self.session.actor.id,
            target,
            "navigated",
            serde_json::json!({}),
        );
        Ok(())
    }

    /// Derive the initial target from an external locator at shell mount.
    /// An absent, unknown, or denied locator target falls back to the
    /// default module instead of failing start-up.
    pub fn restore(&self, locator: Option<&str>) {
        if let Some(target) = locator.and_then(parse_locator) {
            if self.navigate(&target).is_ok() {
                return;
            }
        }
        let default = self.default_module.clone();
        if self.navigate(&default).is_err() {
            // Even the default is unavailable for this session; the shell
            // stays mounted with nothing active.
            warn!(module_id = %default, "default module unavailable, router stays idle");
            self.nav.lock().state = RouterState::Idle;
        }
    }

    /// Capability object for the currently active module: the only surface
    /// the module receives once granted access.
    pub fn active_context(&self) -> Option<crate::host::ModuleContext> {
        let module_id = self.active_module()?;
        Some(crate::host::ModuleContext::new(
            &self.session.actor,
            self.session.capabilities.clone(),
            module_id,
            Arc::clone(&self.audit),
        ))
    }

    /// Modules this session may see: registry order, capability-filtered,
    /// active status only. Feeds the menu.
    pub fn visible_modules(&self) -> Vec<ModuleDescriptor> {
        self.registry
            .list()
            .into_iter()
            .filter(|m| {
                m.status == ModuleStatus::Active
                    && self.session.capabilities.allows(&m.required_capability)
            })
            .collect()
    }
}

/// Extract the module id from a locator like `?module=users` or
/// `module=users&tab=2`.
fn parse_locator(locator: &str) -> Option<String> {
    locator
        .trim_start_matches('?')
        .split('&')
        .find_map(|pair| pair.strip_prefix("module="))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
