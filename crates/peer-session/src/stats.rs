use serde::Serialize;

/// Flattened statistics report, keyed by record id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsReport {
    pub records: Vec<StatsRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsRecord {
    pub id: String,
    pub kind: StatsKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatsKind {
    Transport {
        bytes_sent: u64,
        bytes_received: u64,
        selected_candidate_pair_id: Option<String>,
    },
    CandidatePair {
        local_candidate_id: String,
        remote_candidate_id: String,
    },
    LocalCandidate(CandidateStats),
    RemoteCandidate(CandidateStats),
    Other(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateStats {
    pub address: String,
    pub port: u16,
    pub protocol: String,
    pub candidate_type: String,
}

impl StatsReport {
    pub fn new(records: Vec<StatsRecord>) -> Self {
        Self { records }
    }

    pub fn get(&self, id: &str) -> Option<&StatsRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    fn candidate(&self, id: &str) -> Option<&CandidateStats> {
        match self.get(id).map(|record| &record.kind) {
            Some(StatsKind::LocalCandidate(c)) | Some(StatsKind::RemoteCandidate(c)) => Some(c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSummary {
    pub address: String,
    pub port: u16,
    pub protocol: String,
    pub candidate_type: String,
}

impl From<&CandidateStats> for CandidateSummary {
    fn from(stats: &CandidateStats) -> Self {
        Self {
            address: stats.address.clone(),
            port: stats.port,
            protocol: stats.protocol.clone(),
            candidate_type: stats.candidate_type.clone(),
        }
    }
}

/// Byte counters plus the selected local and remote candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub local: CandidateSummary,
    pub remote: CandidateSummary,
}

impl ConnectionSummary {
    /// Follows the first transport record to its selected candidate pair.
    /// A report with no transport record reduces to the zero summary; a
    /// dangling pair or candidate reference leaves that side zeroed.
    pub fn from_report(report: &StatsReport) -> Self {
        let Some((bytes_sent, bytes_received, pair_id)) =
            report.records.iter().find_map(|record| match &record.kind {
                StatsKind::Transport {
                    bytes_sent,
                    bytes_received,
                    selected_candidate_pair_id,
                } => Some((*bytes_sent, *bytes_received, selected_candidate_pair_id)),
                _ => None,
            })
        else {
            return Self::default();
        };

        let mut summary = Self {
            bytes_sent,
            bytes_received,
            ..Self::default()
        };
        let pair = pair_id
            .as_deref()
            .and_then(|id| report.get(id))
            .and_then(|record| match &record.kind {
                StatsKind::CandidatePair {
                    local_candidate_id,
                    remote_candidate_id,
                } => Some((local_candidate_id, remote_candidate_id)),
                _ => None,
            });
        if let Some((local_id, remote_id)) = pair {
            if let Some(local) = report.candidate(local_id) {
                summary.local = local.into();
            }
            if let Some(remote) = report.candidate(remote_id) {
                summary.remote = remote.into();
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(address: &str, port: u16, kind: &str) -> CandidateStats {
        CandidateStats {
            address: address.into(),
            port,
            protocol: "udp".into(),
            candidate_type: kind.into(),
        }
    }

    fn connected_report() -> StatsReport {
        StatsReport::new(vec![
            StatsRecord {
                id: "codec-1".into(),
                kind: StatsKind::Other("codec".into()),
            },
            StatsRecord {
                id: "T01".into(),
                kind: StatsKind::Transport {
                    bytes_sent: 1200,
                    bytes_received: 3400,
                    selected_candidate_pair_id: Some("CP1".into()),
                },
            },
            StatsRecord {
                id: "CP1".into(),
                kind: StatsKind::CandidatePair {
                    local_candidate_id: "L1".into(),
                    remote_candidate_id: "R1".into(),
                },
            },
            StatsRecord {
                id: "L1".into(),
                kind: StatsKind::LocalCandidate(candidate("192.168.1.4", 50000, "host")),
            },
            StatsRecord {
                id: "R1".into(),
                kind: StatsKind::RemoteCandidate(candidate("203.0.113.9", 61000, "srflx")),
            },
        ])
    }

    #[test_timeout::timeout]
    fn follows_selected_pair() {
        let summary = ConnectionSummary::from_report(&connected_report());
        assert_eq!(summary.bytes_sent, 1200);
        assert_eq!(summary.bytes_received, 3400);
        assert_eq!(summary.local.address, "192.168.1.4");
        assert_eq!(summary.local.candidate_type, "host");
        assert_eq!(summary.remote.port, 61000);
        assert_eq!(summary.remote.protocol, "udp");
    }

    #[test_timeout::timeout]
    fn missing_transport_record_gives_zero_summary() {
        let report = StatsReport::new(vec![StatsRecord {
            id: "L1".into(),
            kind: StatsKind::LocalCandidate(candidate("10.0.0.1", 1, "host")),
        }]);
        assert_eq!(ConnectionSummary::from_report(&report), ConnectionSummary::default());
        assert_eq!(
            ConnectionSummary::from_report(&StatsReport::default()),
            ConnectionSummary::default()
        );
    }

    #[test_timeout::timeout]
    fn dangling_pair_keeps_counters() {
        let report = StatsReport::new(vec![StatsRecord {
            id: "T01".into(),
            kind: StatsKind::Transport {
                bytes_sent: 5,
                bytes_received: 7,
                selected_candidate_pair_id: Some("gone".into()),
            },
        }]);
        let summary = ConnectionSummary::from_report(&report);
        assert_eq!((summary.bytes_sent, summary.bytes_received), (5, 7));
        assert_eq!(summary.local, CandidateSummary::default());
        assert_eq!(summary.remote, CandidateSummary::default());
    }

    #[test_timeout::timeout]
    fn summary_serializes_camel_case() {
        let value = serde_json::to_value(ConnectionSummary::default()).unwrap();
        assert_eq!(value["bytesSent"], 0);
        assert_eq!(value["local"]["candidateType"], "");
    }
}
