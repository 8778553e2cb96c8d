use crate::error::Result;
use log::warn;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Seed file holding the initial cyber incidents
pub const CYBER_CSV: &str = "cyber_incidents.csv";
/// Seed file holding the initial dataset metadata
pub const DATASETS_CSV: &str = "datasets_metadata.csv";
/// Seed file holding the initial IT tickets
pub const TICKETS_CSV: &str = "it_tickets.csv";

/// Location of the seed CSV files used to populate empty tables
#[derive(Debug, Clone)]
pub struct SeedFiles {
    dir: PathBuf,
}

impl SeedFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn incidents(&self) -> PathBuf {
        self.dir.join(CYBER_CSV)
    }

    pub fn datasets(&self) -> PathBuf {
        self.dir.join(DATASETS_CSV)
    }

    pub fn tickets(&self) -> PathBuf {
        self.dir.join(TICKETS_CSV)
    }
}

/// Load every record of a CSV file
///
/// The header row names the fields; column order does not matter. Empty
/// cells deserialize to `None` for optional fields.
///
/// # Examples
/// ```no_run
/// use argus::loader::from_csv;
/// use argus::models::CyberIncident;
///
/// let incidents: Vec<CyberIncident> = from_csv("DATA/cyber_incidents.csv").unwrap();
/// println!("{} incidents", incidents.len());
/// ```
pub fn from_csv<T: DeserializeOwned>(filepath: impl AsRef<Path>) -> Result<Vec<T>> {
    let file = File::open(filepath)?;
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let mut records = Vec::new();
    for record in reader.deserialize() {
        records.push(record?);
    }
    Ok(records)
}

/// Load a seed file, treating a missing file as an empty seed
pub fn read_seed<T: DeserializeOwned>(filepath: &Path) -> Result<Vec<T>> {
    if !filepath.exists() {
        warn!("seed file {} not found, starting empty", filepath.display());
        return Ok(Vec::new());
    }
    from_csv(filepath)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CyberIncident, ItTicket};
    use std::fs;

    #[test]
    fn reads_records_by_header_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CYBER_CSV);
        fs::write(
            &path,
            "incident_id,severity,timestamp,category,status,description\n\
             1,High,2024-11-01 09:00:00,Phishing,Open,Suspicious email\n\
             2,Low,2024-11-02 10:30:00,Malware,Resolved,\n",
        )
        .unwrap();

        let incidents: Vec<CyberIncident> = from_csv(&path).unwrap();
        assert_eq!(incidents.len(), 2);
        assert_eq!(incidents[0].severity, "High");
        assert_eq!(incidents[0].description.as_deref(), Some("Suspicious email"));
        assert_eq!(incidents[1].description, None);
    }

    #[test]
    fn empty_resolution_time_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TICKETS_CSV);
        fs::write(
            &path,
            "ticket_id,priority,description,status,assigned_to,created_at,resolution_time_hours\n\
             7,High,VPN down,Open,IT_Support_A,2024-11-05 08:00:00,\n\
             8,Low,Password reset,Resolved,IT_Support_B,2024-11-05 09:00:00,2.5\n",
        )
        .unwrap();

        let tickets: Vec<ItTicket> = from_csv(&path).unwrap();
        assert_eq!(tickets[0].resolution_time_hours, None);
        assert_eq!(tickets[1].resolution_time_hours, Some(2.5));
    }

    #[test]
    fn missing_seed_is_empty_but_malformed_seed_fails() {
        let dir = tempfile::tempdir().unwrap();
        let seeds = SeedFiles::new(dir.path());

        let none: Vec<CyberIncident> = read_seed(&seeds.incidents()).unwrap();
        assert!(none.is_empty());

        fs::write(seeds.incidents(), "incident_id,severity\nnot-a-number,High\n").unwrap();
        assert!(read_seed::<CyberIncident>(&seeds.incidents()).is_err());
    }
}
