use host_probe::HostFacts;
use local_ip_address::local_ip;
use tracing::debug;

use crate::config::{InstallLayout, NodeConfig};
use crate::installer::{GroupChange, InstallReport, SyncOutcome, UpsOutcome};

/// Show a secret without revealing it.
pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        "(not set)".to_string()
    } else {
        "*".repeat(secret.chars().count().min(8))
    }
}

fn or_unset(value: &str) -> &str {
    if value.is_empty() { "(not set)" } else { value }
}

pub fn print_configuration(config: &NodeConfig, layout: &InstallLayout, facts: &HostFacts) {
    println!("\n        Lab Pi Configuration");
    println!(" Node ID:             {}", or_unset(&config.identity.id));
    println!(" Node name:           {}", or_unset(&config.identity.name));
    println!(" MAC address:         {}", or_unset(&config.identity.mac));
    println!(" Location:            {}", or_unset(&config.identity.location));
    println!(" Experiment ID:       {}", or_unset(&config.experiment.experiment_id));
    println!(" Master URL:          {}", or_unset(&config.master.url));
    println!(" Master API key:      {}", mask_secret(&config.master.api_key));
    println!();
    println!(" Service user:        {}", layout.user);
    println!(" Project directory:   {}", layout.project_dir.display());
    println!(" Repository:          {}", layout.repo_url);
    println!(" Host:                {} ({}, {})", facts.hostname, facts.architecture, facts.platform);
    println!();
}

/// Where the node's dashboard will answer once the service runs.
pub fn dashboard_url(config: &NodeConfig) -> Option<String> {
    match local_ip() {
        Ok(ip) => Some(format!("http://{}:{}", ip, config.server.port)),
        Err(e) => {
            debug!("Could not determine local IP address: {}", e);
            None
        }
    }
}

pub fn print_final_summary(report: &InstallReport) {
    let layout = &report.layout;

    println!("\n        Lab Pi installation complete");
    println!(" Node ID:             {}", or_unset(&report.config.identity.id));
    println!(" Experiment ID:       {}", or_unset(&report.config.experiment.experiment_id));
    println!(" Source:              {}", describe_sync(&report.sync));
    println!(" UPS driver:          {}", describe_ups(&report.ups));
    println!(" Environment file:    {}", layout.env_file().display());
    println!(" Service unit:        {}", layout.unit_path().display());
    println!(" Log file:            {}", layout.log_path.display());
    if let Some(url) = dashboard_url(&report.config) {
        println!(" Dashboard:           {}", url);
    }
    println!();
    println!(" The service is enabled but not started. Start it with:");
    println!("     sudo systemctl start {}", layout.service_name);
    println!(" Follow its output with:");
    println!("     tail -f {}", layout.log_path.display());

    let added: Vec<&str> = report
        .groups
        .iter()
        .filter(|(_, change)| *change == GroupChange::Added)
        .map(|(group, _)| group.as_str())
        .collect();
    if !added.is_empty() {
        println!();
        println!(
            " {} was added to {}; log out and back in for this to take effect.",
            layout.user,
            added.join(", ")
        );
    }
    println!();
}

pub fn describe_sync(sync: &SyncOutcome) -> String {
    match sync {
        SyncOutcome::Cloned => "cloned".to_string(),
        SyncOutcome::Pulled => "pulled latest changes".to_string(),
        SyncOutcome::ResetToRemote {
            mainline,
            discarded_head: Some(head),
        } => format!("reset to {} (discarded {})", mainline, head),
        SyncOutcome::ResetToRemote { mainline, .. } => format!("reset to {}", mainline),
    }
}

pub fn describe_ups(ups: &UpsOutcome) -> String {
    match ups {
        UpsOutcome::Installed => "installed".to_string(),
        UpsOutcome::NotEligible(reason) => format!("skipped ({})", reason),
        UpsOutcome::ScriptMissing(path) => format!("skipped ({} not found)", path.display()),
        UpsOutcome::Failed(Some(code)) => format!("installer failed (exit code {})", code),
        UpsOutcome::Failed(None) => "installer failed".to_string(),
        UpsOutcome::Disabled => "disabled".to_string(),
    }
}
