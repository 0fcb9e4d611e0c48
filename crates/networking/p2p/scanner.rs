//! Subnet scanning for peer banks and robbery-target selection.

use std::time::Duration;

use bankd_common::BankInfo;
use futures::{StreamExt, stream};
use tracing::{debug, info};

use crate::{connector::BankConnector, security::SecurityGuard};

/// How many probes are in flight at once during a subnet scan.
const SCAN_CONCURRENCY: usize = 50;

/// Probes every `ip × port` combination of the configured subnet and port
/// range, collecting a [`BankInfo`] for each responding bank.
#[derive(Debug, Clone)]
pub struct NetworkScanner {
    port_range: [u16; 2],
    subnet: String,
    connector: BankConnector,
    security: SecurityGuard,
}

impl NetworkScanner {
    pub fn new(
        port_range: [u16; 2],
        subnet: String,
        timeout: Duration,
        security: SecurityGuard,
    ) -> Self {
        Self {
            port_range,
            subnet,
            connector: BankConnector::new(timeout),
            security,
        }
    }

    /// Scans the subnet for active banks, skipping our own address.
    pub async fn scan_network(&self, our_ip: &str) -> Vec<BankInfo> {
        let [start_port, end_port] = self.port_range;
        let targets: Vec<(String, u16)> = (1..255)
            .map(|octet| format!("{}.{}", self.subnet, octet))
            .flat_map(|ip| (start_port..=end_port).map(move |port| (ip.clone(), port)))
            .collect();

        info!(
            "Scanning {} targets in subnet {}.0/24",
            targets.len(),
            self.subnet
        );

        let banks: Vec<BankInfo> = stream::iter(targets)
            .map(|(ip, port)| self.check_target(ip, port, our_ip))
            .buffer_unordered(SCAN_CONCURRENCY)
            .filter_map(|result| async move { result })
            .collect()
            .await;

        info!("Found {} active banks", banks.len());
        banks
    }

    async fn check_target(&self, ip: String, port: u16, our_ip: &str) -> Option<BankInfo> {
        if ip == our_ip {
            return None;
        }
        self.connector.get_bank_code(&ip, port).await?;
        self.security.save_known_port(&ip, port).await;

        let total_amount = self.connector.get_bank_amount(&ip, port).await?;
        let client_count = self.connector.get_client_count(&ip, port).await?;
        debug!("Found bank at {ip}:{port} - Amount: {total_amount}, Clients: {client_count}");
        Some(BankInfo {
            ip,
            port,
            total_amount,
            client_count,
        })
    }

    /// Selects banks to cover `target_amount`.
    ///
    /// Banks are ranked by efficiency (amount per affected client) and taken
    /// greedily from the top. Before each take, the remaining pool is checked
    /// for a single bank that covers the whole remainder with no more clients
    /// than the current head; if one exists it finishes the plan.
    pub fn find_robbery_targets(&self, target_amount: u64, banks: &[BankInfo]) -> Vec<BankInfo> {
        if banks.is_empty() || target_amount == 0 {
            return Vec::new();
        }

        let mut available = banks.to_vec();
        available.sort_by(|a, b| b.efficiency().total_cmp(&a.efficiency()));

        let mut selected = Vec::new();
        let mut accumulated: u64 = 0;

        while accumulated < target_amount && !available.is_empty() {
            let remaining = target_amount - accumulated;
            let head_clients = available[0].client_count;

            if let Some(finisher_index) = available
                .iter()
                .position(|bank| bank.total_amount >= remaining && bank.client_count <= head_clients)
            {
                selected.push(available.remove(finisher_index));
                break;
            }

            let head = available.remove(0);
            accumulated += head.total_amount;
            selected.push(head);
        }

        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> NetworkScanner {
        NetworkScanner::new(
            [65525, 65535],
            "10.1.2".to_string(),
            Duration::from_millis(100),
            SecurityGuard::new(Duration::from_secs(60)),
        )
    }

    fn bank(ip: &str, total_amount: u64, client_count: u64) -> BankInfo {
        BankInfo {
            ip: ip.to_string(),
            port: 65530,
            total_amount,
            client_count,
        }
    }

    #[test]
    fn empty_input_or_zero_target_selects_nothing() {
        let scanner = scanner();
        assert!(scanner.find_robbery_targets(1000, &[]).is_empty());
        assert!(
            scanner
                .find_robbery_targets(0, &[bank("10.1.2.7", 500, 1)])
                .is_empty()
        );
    }

    #[test]
    fn single_covering_bank_is_taken_alone() {
        let scanner = scanner();
        let banks = [bank("10.1.2.7", 2000, 3), bank("10.1.2.8", 100, 1)];
        let targets = scanner.find_robbery_targets(1500, &banks);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].ip, "10.1.2.7");
    }

    #[test]
    fn greedy_accumulates_by_efficiency_until_covered() {
        let scanner = scanner();
        // Efficiencies: 400, 100, 50. No single bank ever covers the
        // remainder until the last step, so the plan grows greedily in
        // efficiency order.
        let banks = [
            bank("10.1.2.7", 800, 2),
            bank("10.1.2.8", 1000, 10),
            bank("10.1.2.9", 500, 10),
        ];
        let targets = scanner.find_robbery_targets(2300, &banks);
        let ips: Vec<&str> = targets.iter().map(|b| b.ip.as_str()).collect();
        assert_eq!(ips, vec!["10.1.2.7", "10.1.2.8", "10.1.2.9"]);
    }

    #[test]
    fn finisher_covers_the_remainder_and_stops_the_plan() {
        let scanner = scanner();
        // The whale (5000 across 50 clients) never qualifies as a finisher;
        // once the efficient head is taken, the mid bank covers the rest.
        let banks = [
            bank("10.1.2.7", 1000, 10),
            bank("10.1.2.8", 800, 2),
            bank("10.1.2.9", 5000, 50),
        ];
        let targets = scanner.find_robbery_targets(1500, &banks);
        let ips: Vec<&str> = targets.iter().map(|b| b.ip.as_str()).collect();
        assert_eq!(ips, vec!["10.1.2.8", "10.1.2.7"]);
    }

    #[test]
    fn plan_can_fall_short_when_the_network_is_poor() {
        let scanner = scanner();
        let banks = [bank("10.1.2.7", 100, 1), bank("10.1.2.8", 50, 1)];
        let targets = scanner.find_robbery_targets(1_000_000, &banks);
        // Every bank is taken even though the target is unreachable.
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn head_acting_as_its_own_finisher_stops_immediately() {
        let scanner = scanner();
        let banks = [bank("10.1.2.7", 900, 3), bank("10.1.2.8", 600, 30)];
        let targets = scanner.find_robbery_targets(900, &banks);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].ip, "10.1.2.7");
    }
}
