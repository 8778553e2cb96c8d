use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Severity levels offered by the incident forms (also used as ticket priorities)
pub const SEVERITIES: [&str; 4] = ["Low", "Medium", "High", "Critical"];

/// Ticket priorities
pub const PRIORITIES: [&str; 4] = SEVERITIES;

/// Incident categories
pub const INCIDENT_CATEGORIES: [&str; 5] = [
    "Phishing",
    "Malware",
    "DDoS",
    "Unauthorized Access",
    "Misconfiguration",
];

/// Incident lifecycle states
pub const INCIDENT_STATUSES: [&str; 4] = ["Open", "In Progress", "Resolved", "Closed"];

/// Ticket lifecycle states
pub const TICKET_STATUSES: [&str; 4] = ["Open", "In Progress", "Resolved", "Waiting for User"];

/// Support staff a ticket can be assigned to
pub const TICKET_ASSIGNEES: [&str; 3] = ["IT_Support_A", "IT_Support_B", "IT_Support_C"];

/// Sources a dataset can be uploaded by
pub const DATASET_UPLOADERS: [&str; 3] = ["data_scientist", "cyber_admin", "it_admin"];

/// Role of a registered user
///
/// Roles are stored verbatim as their tag (`user`, `cybersecurity`,
/// `data_scientist`, `it_admin`). The general `user` role may view every
/// domain; the other roles are limited to their own domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Cybersecurity,
    DataScientist,
    ItAdmin,
}

#[derive(Debug, Error)]
#[error("unknown role '{0}'")]
pub struct ParseRoleError(pub String);

impl Role {
    pub const ALL: [Role; 4] = [
        Role::User,
        Role::Cybersecurity,
        Role::DataScientist,
        Role::ItAdmin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Cybersecurity => "cybersecurity",
            Role::DataScientist => "data_scientist",
            Role::ItAdmin => "it_admin",
        }
    }

    /// Whether a session holding this role may open `page`
    pub fn can_view(self, page: Page) -> bool {
        match page {
            Page::Dashboard | Page::Assistant => true,
            Page::Cybersecurity => matches!(self, Role::User | Role::Cybersecurity),
            Page::DataScience => matches!(self, Role::User | Role::DataScientist),
            Page::ItOperations => matches!(self, Role::User | Role::ItAdmin),
        }
    }

    /// The domain page a specialised role works in, `None` for the general role
    pub fn home_page(self) -> Option<Page> {
        match self {
            Role::User => None,
            Role::Cybersecurity => Some(Page::Cybersecurity),
            Role::DataScientist => Some(Page::DataScience),
            Role::ItAdmin => Some(Page::ItOperations),
        }
    }

    /// Navigation links shown in the sidebar of `current`
    ///
    /// The dashboard links to every domain the role works in. Domain pages
    /// link back to the dashboard and, for the general role, to the other
    /// domains and the assistant. The assistant links to the dashboard only.
    pub fn sidebar(self, current: Page) -> Vec<Page> {
        const DOMAINS: [Page; 3] = [Page::Cybersecurity, Page::DataScience, Page::ItOperations];

        match current {
            Page::Dashboard => match self.home_page() {
                Some(home) => vec![home],
                None => DOMAINS.to_vec(),
            },
            Page::Assistant => vec![Page::Dashboard],
            domain => {
                let mut links = vec![Page::Dashboard];
                if self == Role::User {
                    links.extend(DOMAINS.into_iter().filter(|p| *p != domain));
                    links.push(Page::Assistant);
                }
                links
            }
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| ParseRoleError(s.to_string()))
    }
}

/// Pages of the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Dashboard,
    Cybersecurity,
    DataScience,
    ItOperations,
    Assistant,
}

impl Page {
    pub fn path(self) -> &'static str {
        match self {
            Page::Dashboard => "/dashboard",
            Page::Cybersecurity => "/cybersecurity",
            Page::DataScience => "/data-science",
            Page::ItOperations => "/it-operations",
            Page::Assistant => "/assistant",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Page::Dashboard => "Dashboard",
            Page::Cybersecurity => "Cybersecurity",
            Page::DataScience => "Data Science",
            Page::ItOperations => "IT Operations",
            Page::Assistant => "AI assistant",
        }
    }
}

/// Registered user as stored in the `users` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Argon2 PHC string, never the plaintext password
    pub password_hash: String,
    pub role: Role,
}

/// Row of `cyber_incidents`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CyberIncident {
    pub incident_id: i64,
    pub timestamp: String,
    pub severity: String,
    pub category: String,
    pub status: String,
    pub description: Option<String>,
}

/// Row of `it_tickets`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItTicket {
    pub ticket_id: i64,
    pub priority: String,
    pub description: String,
    pub status: String,
    pub assigned_to: String,
    pub created_at: String,
    pub resolution_time_hours: Option<f64>,
}

/// Row of `datasets_metadata`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub dataset_id: i64,
    pub name: String,
    pub rows: i64,
    pub columns: i64,
    pub uploaded_by: String,
    pub upload_date: String,
}

/// Fields an incident update may change
#[derive(Debug, Clone, Deserialize)]
pub struct IncidentUpdate {
    pub status: String,
    pub severity: String,
}

/// Fields a ticket update may change
#[derive(Debug, Clone, Deserialize)]
pub struct TicketUpdate {
    pub status: String,
    pub priority: String,
    pub resolution_time_hours: f64,
}

/// Fields a dataset update may change
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetUpdate {
    pub name: String,
    pub rows: i64,
    pub columns: i64,
}

/// A single cell of a rendered or exported table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Empty,
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Empty => Ok(()),
        }
    }
}

/// Records that can be shown as a table and exported
pub trait Tabular {
    /// Singular name used in messages ("Incident 4 not found")
    const KIND: &'static str;
    const HEADERS: &'static [&'static str];

    fn id(&self) -> i64;
    fn cells(&self) -> Vec<CellValue>;
}

fn text(s: &str) -> CellValue {
    CellValue::Text(s.to_string())
}

impl Tabular for CyberIncident {
    const KIND: &'static str = "Incident";
    const HEADERS: &'static [&'static str] = &[
        "incident_id",
        "timestamp",
        "severity",
        "category",
        "status",
        "description",
    ];

    fn id(&self) -> i64 {
        self.incident_id
    }

    fn cells(&self) -> Vec<CellValue> {
        vec![
            CellValue::Number(self.incident_id as f64),
            text(&self.timestamp),
            text(&self.severity),
            text(&self.category),
            text(&self.status),
            self.description.as_deref().map_or(CellValue::Empty, text),
        ]
    }
}

impl Tabular for ItTicket {
    const KIND: &'static str = "Ticket";
    const HEADERS: &'static [&'static str] = &[
        "ticket_id",
        "priority",
        "description",
        "status",
        "assigned_to",
        "created_at",
        "resolution_time_hours",
    ];

    fn id(&self) -> i64 {
        self.ticket_id
    }

    fn cells(&self) -> Vec<CellValue> {
        vec![
            CellValue::Number(self.ticket_id as f64),
            text(&self.priority),
            text(&self.description),
            text(&self.status),
            text(&self.assigned_to),
            text(&self.created_at),
            self.resolution_time_hours
                .map_or(CellValue::Empty, CellValue::Number),
        ]
    }
}

impl Tabular for DatasetMetadata {
    const KIND: &'static str = "Dataset";
    const HEADERS: &'static [&'static str] = &[
        "dataset_id",
        "name",
        "rows",
        "columns",
        "uploaded_by",
        "upload_date",
    ];

    fn id(&self) -> i64 {
        self.dataset_id
    }

    fn cells(&self) -> Vec<CellValue> {
        vec![
            CellValue::Number(self.dataset_id as f64),
            text(&self.name),
            CellValue::Number(self.rows as f64),
            CellValue::Number(self.columns as f64),
            text(&self.uploaded_by),
            text(&self.upload_date),
        ]
    }
}

/// Default ID offered by a create form: one past the largest existing ID
pub fn next_id<T: Tabular>(records: &[T]) -> i64 {
    records.iter().map(|record| record.id()).max().map_or(1, |max| max + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_its_tag() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("admin".parse::<Role>().is_err());
        assert!("User".parse::<Role>().is_err());
    }

    #[test]
    fn general_role_sees_every_domain() {
        for page in [Page::Cybersecurity, Page::DataScience, Page::ItOperations] {
            assert!(Role::User.can_view(page));
        }
    }

    #[test]
    fn specialised_roles_are_confined_to_their_domain() {
        assert!(Role::Cybersecurity.can_view(Page::Cybersecurity));
        assert!(!Role::Cybersecurity.can_view(Page::DataScience));
        assert!(!Role::Cybersecurity.can_view(Page::ItOperations));

        assert!(Role::DataScientist.can_view(Page::DataScience));
        assert!(!Role::DataScientist.can_view(Page::Cybersecurity));

        assert!(Role::ItAdmin.can_view(Page::ItOperations));
        assert!(!Role::ItAdmin.can_view(Page::DataScience));

        for role in Role::ALL {
            assert!(role.can_view(Page::Dashboard));
            assert!(role.can_view(Page::Assistant));
        }
    }

    #[test]
    fn sidebar_links_follow_the_role() {
        assert_eq!(
            Role::User.sidebar(Page::Dashboard),
            [Page::Cybersecurity, Page::DataScience, Page::ItOperations]
        );
        assert_eq!(Role::ItAdmin.sidebar(Page::Dashboard), [Page::ItOperations]);

        assert_eq!(
            Role::User.sidebar(Page::Cybersecurity),
            [Page::Dashboard, Page::DataScience, Page::ItOperations, Page::Assistant]
        );
        assert_eq!(Role::Cybersecurity.sidebar(Page::Cybersecurity), [Page::Dashboard]);

        for role in Role::ALL {
            assert_eq!(role.sidebar(Page::Assistant), [Page::Dashboard]);
        }
    }

    #[test]
    fn next_id_starts_at_one_and_follows_the_maximum() {
        let empty: Vec<DatasetMetadata> = Vec::new();
        assert_eq!(next_id(&empty), 1);

        let make = |id| DatasetMetadata {
            dataset_id: id,
            name: "n".into(),
            rows: 1,
            columns: 1,
            uploaded_by: "it_admin".into(),
            upload_date: "2024-01-01".into(),
        };
        assert_eq!(next_id(&[make(3), make(9), make(4)]), 10);
    }

    #[test]
    fn missing_optional_cells_are_empty() {
        let ticket = ItTicket {
            ticket_id: 1,
            priority: "Low".into(),
            description: "printer".into(),
            status: "Open".into(),
            assigned_to: "IT_Support_A".into(),
            created_at: "2024-01-01 09:00:00".into(),
            resolution_time_hours: None,
        };
        let cells = ticket.cells();
        assert_eq!(cells.len(), ItTicket::HEADERS.len());
        assert_eq!(cells[6], CellValue::Empty);
        assert_eq!(cells[0].to_string(), "1");
    }
}
