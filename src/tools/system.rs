use async_trait::async_trait;
use serde_json::Value;

use crate::traits::Tool;

pub struct SystemInfoTool;

/// Run a command and return trimmed stdout, or None if it failed to start.
async fn capture(cmd: &str, args: &[&str]) -> Option<String> {
    let output = tokio::process::Command::new(cmd)
        .args(args)
        .output()
        .await
        .ok()?;
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl Tool for SystemInfoTool {
    fn name(&self) -> &str {
        "system_info"
    }

    fn description(&self) -> &str {
        "Get host, OS, uptime, memory and disk information"
    }

    async fn call(&self, _args: &Value) -> anyhow::Result<String> {
        let mut info = String::new();

        if let Some(hostname) = capture("hostname", &[]).await {
            info.push_str(&format!("Hostname: {}\n", hostname));
        }

        #[cfg(unix)]
        {
            if let Some(uname) = capture("uname", &["-a"]).await {
                info.push_str(&format!("OS: {}\n", uname));
            }
            if let Some(uptime) = capture("uptime", &[]).await {
                info.push_str(&format!("Uptime: {}\n", uptime));
            }
            if let Some(disk) = capture("df", &["-h", "/"]).await {
                info.push_str(&format!("Disk:\n{}\n", disk));
            }
        }

        #[cfg(target_os = "linux")]
        if let Some(mem) = capture("free", &["-h"]).await {
            info.push_str(&format!("Memory:\n{}\n", mem));
        }

        #[cfg(target_os = "macos")]
        if let Some(mem) = capture("vm_stat", &[]).await {
            info.push_str(&format!("Memory:\n{}\n", mem));
        }

        #[cfg(windows)]
        if let Some(ver) = capture("cmd", &["/C", "ver"]).await {
            info.push_str(&format!("OS: {}\n", ver));
        }

        if info.is_empty() {
            info.push_str("Could not retrieve system information.");
        }

        Ok(info)
    }
}
