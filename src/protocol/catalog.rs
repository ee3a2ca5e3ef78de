//! Command batches sent once a client is attached.
//!
//! Three groups are dispatched in fixed order: primary, subscription,
//! secondary. Each group is configured as `all` (the canonical list below),
//! `none`, or an explicit list that is sent verbatim in the caller's order.

use serde::{Deserialize, Serialize};

/// When a canonical catalog entry is included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inclusion {
    Always,
    /// GUI registration, only for full-client connections
    FullClient,
    /// Only when a low-bandwidth connection was requested
    LowBandwidth,
}

/// One canonical catalog entry; `{program}` and `{station}` are substituted
#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    pub template: &'static str,
    pub inclusion: Inclusion,
}

const fn always(template: &'static str) -> CatalogEntry {
    CatalogEntry {
        template,
        inclusion: Inclusion::Always,
    }
}

pub const PRIMARY: &[CatalogEntry] = &[
    CatalogEntry {
        template: "client gui",
        inclusion: Inclusion::FullClient,
    },
    always("client program {program}"),
    always("client station {station}"),
    CatalogEntry {
        template: "client low_bw_connect",
        inclusion: Inclusion::LowBandwidth,
    },
    always("info"),
    always("version"),
    always("ant list"),
    always("mic list"),
    always("profile global info"),
    always("profile tx info"),
    always("profile mic info"),
    always("profile display info"),
];

pub const SUBSCRIPTION: &[CatalogEntry] = &[
    always("sub client all"),
    always("sub tx all"),
    always("sub atu all"),
    always("sub amplifier all"),
    always("sub meter all"),
    always("sub pan all"),
    always("sub slice all"),
    always("sub gps all"),
    always("sub audio_stream all"),
    always("sub cwx all"),
    always("sub xvtr all"),
    always("sub memories all"),
    always("sub daxiq all"),
    always("sub dax all"),
    always("sub usb_cable all"),
    always("sub tnf all"),
    always("sub spot all"),
    always("sub radio all"),
    always("sub codec all"),
    always("sub dvk all"),
];

pub const SECONDARY: &[CatalogEntry] = &[
    always("keepalive enable"),
    always("client set enforce_network_mtu=1 network_mtu=1450"),
];

/// How one group is configured
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandBatch {
    /// Send every canonical member of the group
    #[default]
    All,
    /// Send nothing from this group
    None,
    /// Send exactly these commands, in this order
    Explicit(Vec<String>),
}

/// Per-connection facts that decide conditional members and substitutions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogContext {
    pub program: String,
    pub station: String,
    pub full_client: bool,
    pub low_bandwidth: bool,
}

impl CatalogContext {
    fn includes(&self, inclusion: Inclusion) -> bool {
        match inclusion {
            Inclusion::Always => true,
            Inclusion::FullClient => self.full_client,
            Inclusion::LowBandwidth => self.low_bandwidth,
        }
    }

    fn render(&self, template: &str) -> String {
        template
            .replace("{program}", &self.program)
            .replace("{station}", &self.station)
    }
}

impl CommandBatch {
    /// Expand this batch against its group's canonical list
    pub fn expand(&self, canonical: &[CatalogEntry], context: &CatalogContext) -> Vec<String> {
        match self {
            CommandBatch::All => canonical
                .iter()
                .filter(|entry| context.includes(entry.inclusion))
                .map(|entry| context.render(entry.template))
                .collect(),
            CommandBatch::None => Vec::new(),
            CommandBatch::Explicit(commands) => commands.clone(),
        }
    }
}

/// Configured batches for all three groups
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandCatalog {
    #[serde(default)]
    pub primary: CommandBatch,
    #[serde(default)]
    pub subscription: CommandBatch,
    #[serde(default)]
    pub secondary: CommandBatch,
}

impl CommandCatalog {
    /// Every command to send, primary then subscription then secondary
    pub fn commands(&self, context: &CatalogContext) -> Vec<String> {
        let mut commands = self.primary.expand(PRIMARY, context);
        commands.extend(self.subscription.expand(SUBSCRIPTION, context));
        commands.extend(self.secondary.expand(SECONDARY, context));
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(full_client: bool, low_bandwidth: bool) -> CatalogContext {
        CatalogContext {
            program: "sdr-link".into(),
            station: "shack".into(),
            full_client,
            low_bandwidth,
        }
    }

    #[test]
    fn send_all_expands_in_group_order() {
        let commands = CommandCatalog::default().commands(&context(false, false));
        assert_eq!(commands[0], "client program sdr-link");
        assert_eq!(commands[1], "client station shack");

        let first_sub = commands.iter().position(|c| c.starts_with("sub ")).unwrap_or(0);
        let keepalive = commands.iter().position(|c| c == "keepalive enable").unwrap_or(0);
        assert!(first_sub > 0 && keepalive > first_sub);
        assert_eq!(
            commands.len(),
            PRIMARY.len() - 2 + SUBSCRIPTION.len() + SECONDARY.len()
        );
    }

    #[test]
    fn conditional_members_follow_flags() {
        let plain = CommandBatch::All.expand(PRIMARY, &context(false, false));
        assert!(!plain.iter().any(|c| c == "client gui"));
        assert!(!plain.iter().any(|c| c == "client low_bw_connect"));

        let full = CommandBatch::All.expand(PRIMARY, &context(true, true));
        assert_eq!(full[0], "client gui");
        assert!(full.iter().any(|c| c == "client low_bw_connect"));
    }

    #[test]
    fn explicit_lists_keep_caller_order() {
        let catalog = CommandCatalog {
            primary: CommandBatch::Explicit(vec!["version".into(), "info".into()]),
            subscription: CommandBatch::None,
            secondary: CommandBatch::Explicit(vec!["sub meter all".into()]),
        };
        assert_eq!(
            catalog.commands(&context(true, false)),
            vec!["version", "info", "sub meter all"]
        );
    }
}
