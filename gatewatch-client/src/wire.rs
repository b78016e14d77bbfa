//! Response bodies of the router telemetry API and their conversion into
//! [`FeedPayload`]s.
//!
//! ## Series keys
//!
//! | Endpoint | Keys |
//! |---|---|
//! | `/api/system/current` | `system`, `disk:<device>`, `temp:<sensor>`, `clients` |
//! | `/api/system/history` | `system` |
//! | `/api/system/disk-io/history` | `<device>` |
//! | `/api/system/temperatures/history` | `<sensor>` |

use chrono::DateTime;
use serde::Deserialize;

use gatewatch_types::{FeedPayload, Sample, SeriesKey};

use crate::FeedError;

/// Timestamp as sent by the backend: unix milliseconds or RFC 3339.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum WireTimestamp {
    Millis(i64),
    Text(String),
}

impl WireTimestamp {
    /// Unix milliseconds.
    pub fn to_millis(&self) -> Result<i64, FeedError> {
        match self {
            WireTimestamp::Millis(ms) => Ok(*ms),
            WireTimestamp::Text(text) => DateTime::parse_from_rfc3339(text)
                .map(|dt| dt.timestamp_millis())
                .map_err(|e| FeedError::Decode(format!("bad timestamp '{}': {}", text, e))),
        }
    }
}

/// Body of `/api/system/current`.
#[derive(Debug, Deserialize)]
pub struct CurrentSnapshot {
    pub timestamp: WireTimestamp,
    #[serde(default)]
    pub cpu_percent: Option<f64>,
    #[serde(default)]
    pub memory_percent: Option<f64>,
    #[serde(default)]
    pub load_avg_1m: Option<f64>,
    #[serde(default)]
    pub disk_io: Vec<DiskIoReading>,
    #[serde(default)]
    pub temperatures: Vec<TemperatureReading>,
    #[serde(default)]
    pub clients: Option<ClientCounts>,
}

#[derive(Debug, Deserialize)]
pub struct DiskIoReading {
    pub device: String,
    #[serde(default)]
    pub read_mbps: f64,
    #[serde(default)]
    pub write_mbps: f64,
}

#[derive(Debug, Deserialize)]
pub struct TemperatureReading {
    pub sensor: String,
    pub temperature_c: f64,
}

#[derive(Debug, Deserialize)]
pub struct ClientCounts {
    #[serde(default)]
    pub wired: u32,
    #[serde(default)]
    pub wireless: u32,
}

/// Envelope shared by all history endpoints.
#[derive(Debug, Deserialize)]
pub struct HistoryResponse<T> {
    #[serde(default = "Vec::new")]
    pub samples: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct SystemPoint {
    pub timestamp: WireTimestamp,
    #[serde(default)]
    pub cpu_percent: Option<f64>,
    #[serde(default)]
    pub memory_percent: Option<f64>,
    #[serde(default)]
    pub load_avg_1m: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct DiskIoPoint {
    pub timestamp: WireTimestamp,
    pub device: String,
    #[serde(default)]
    pub read_mbps: f64,
    #[serde(default)]
    pub write_mbps: f64,
}

#[derive(Debug, Deserialize)]
pub struct TemperaturePoint {
    pub timestamp: WireTimestamp,
    pub sensor: String,
    pub temperature_c: f64,
}

/// Key of the current snapshot's per-disk series.
pub fn disk_key(device: &str) -> SeriesKey {
    SeriesKey::new(format!("disk:{}", device))
}

/// Key of the current snapshot's per-sensor series.
pub fn temperature_key(sensor: &str) -> SeriesKey {
    SeriesKey::new(format!("temp:{}", sensor))
}

impl CurrentSnapshot {
    pub fn into_payload(self) -> Result<FeedPayload, FeedError> {
        let ts = self.timestamp.to_millis()?;
        let mut payload = FeedPayload::new();

        payload.push(
            SeriesKey::SYSTEM,
            Sample::at(ts)
                .with_opt("cpu_percent", self.cpu_percent)
                .with_opt("memory_percent", self.memory_percent)
                .with_opt("load_avg_1m", self.load_avg_1m),
        );

        for disk in self.disk_io {
            payload.push(
                disk_key(&disk.device),
                Sample::at(ts)
                    .with("read_mbps", disk.read_mbps)
                    .with("write_mbps", disk.write_mbps),
            );
        }

        for temp in self.temperatures {
            payload.push(
                temperature_key(&temp.sensor),
                Sample::at(ts).with("temperature_c", temp.temperature_c),
            );
        }

        if let Some(clients) = self.clients {
            payload.push(
                "clients",
                Sample::at(ts)
                    .with("wired", clients.wired as f64)
                    .with("wireless", clients.wireless as f64),
            );
        }

        Ok(payload)
    }
}

impl HistoryResponse<SystemPoint> {
    pub fn into_payload(self) -> Result<FeedPayload, FeedError> {
        self.samples
            .into_iter()
            .try_fold(FeedPayload::new(), |mut payload, point| {
                payload.push(
                    SeriesKey::SYSTEM,
                    Sample::at(point.timestamp.to_millis()?)
                        .with_opt("cpu_percent", point.cpu_percent)
                        .with_opt("memory_percent", point.memory_percent)
                        .with_opt("load_avg_1m", point.load_avg_1m),
                );
                Ok(payload)
            })
    }
}

impl HistoryResponse<DiskIoPoint> {
    pub fn into_payload(self) -> Result<FeedPayload, FeedError> {
        self.samples
            .into_iter()
            .try_fold(FeedPayload::new(), |mut payload, point| {
                payload.push(
                    point.device,
                    Sample::at(point.timestamp.to_millis()?)
                        .with("read_mbps", point.read_mbps)
                        .with("write_mbps", point.write_mbps),
                );
                Ok(payload)
            })
    }
}

impl HistoryResponse<TemperaturePoint> {
    pub fn into_payload(self) -> Result<FeedPayload, FeedError> {
        self.samples
            .into_iter()
            .try_fold(FeedPayload::new(), |mut payload, point| {
                payload.push(
                    point.sensor,
                    Sample::at(point.timestamp.to_millis()?)
                        .with("temperature_c", point.temperature_c),
                );
                Ok(payload)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_formats() {
        assert_eq!(WireTimestamp::Millis(42).to_millis().unwrap(), 42);
        let ts = WireTimestamp::Text("1970-01-01T00:00:01.500Z".into());
        assert_eq!(ts.to_millis().unwrap(), 1500);
        assert!(matches!(
            WireTimestamp::Text("yesterday".into()).to_millis(),
            Err(FeedError::Decode(_))
        ));
    }

    #[test]
    fn test_current_snapshot_partitions_by_instance() {
        let json = r#"{
            "timestamp": 1000,
            "cpu_percent": 20.0,
            "memory_percent": 41.5,
            "load_avg_1m": 0.7,
            "disk_io": [
                {"device": "sda", "read_mbps": 1.0, "write_mbps": 2.0},
                {"device": "mmcblk0", "read_mbps": 0.0, "write_mbps": 0.1}
            ],
            "temperatures": [{"sensor": "cpu_thermal", "temperature_c": 51.2}],
            "clients": {"wired": 3, "wireless": 9}
        }"#;

        let snapshot: CurrentSnapshot = serde_json::from_str(json).unwrap();
        let payload = snapshot.into_payload().unwrap();

        let keys: Vec<&str> = payload.keys().into_iter().map(SeriesKey::as_str).collect();
        assert_eq!(
            keys,
            vec!["system", "disk:sda", "disk:mmcblk0", "temp:cpu_thermal", "clients"]
        );

        let system = payload.iter().next().unwrap();
        assert_eq!(system.sample.get("cpu_percent"), Some(20.0));
        assert_eq!(system.sample.timestamp_ms(), 1000);
    }

    #[test]
    fn test_current_snapshot_tolerates_missing_sections() {
        let snapshot: CurrentSnapshot =
            serde_json::from_str(r#"{"timestamp": 5, "cpu_percent": 1.0}"#).unwrap();
        let payload = snapshot.into_payload().unwrap();
        assert_eq!(payload.len(), 1);
        assert_eq!(payload.iter().next().unwrap().sample.get("memory_percent"), None);
    }

    #[test]
    fn test_disk_history_keys_by_device() {
        let json = r#"{"samples": [
            {"timestamp": 1, "device": "sda", "read_mbps": 1.0, "write_mbps": 0.0},
            {"timestamp": 1, "device": "sdb", "read_mbps": 2.0, "write_mbps": 0.0},
            {"timestamp": 2, "device": "sda", "read_mbps": 3.0, "write_mbps": 0.5}
        ]}"#;
        let history: HistoryResponse<DiskIoPoint> = serde_json::from_str(json).unwrap();
        let payload = history.into_payload().unwrap();

        assert_eq!(payload.len(), 3);
        assert_eq!(payload.keys().len(), 2);
    }

    #[test]
    fn test_temperature_history_bad_timestamp_fails() {
        let json = r#"{"samples": [{"timestamp": "soon", "sensor": "nvme", "temperature_c": 40.0}]}"#;
        let history: HistoryResponse<TemperaturePoint> = serde_json::from_str(json).unwrap();
        assert!(matches!(history.into_payload(), Err(FeedError::Decode(_))));
    }

    #[test]
    fn test_empty_history() {
        let history: HistoryResponse<SystemPoint> = serde_json::from_str("{}").unwrap();
        assert!(history.into_payload().unwrap().is_empty());
    }
}
