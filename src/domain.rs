//! CRM entities. Each is a flat record stored as a document in its own
//! collection; the document id is kept outside the struct (see `crud::Record`).
//!
//! Every field defaults when absent so partially filled forms still load, and
//! unknown fields are ignored.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::identity::Role;

/// A record type persisted in a named collection.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;

    /// Fill server-assigned fields before the first write.
    fn on_create(&mut self) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LeadStatus { #[default] New, Contacted, Qualified, Proposal, Won, Lost }

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Proposal => "proposal",
            LeadStatus::Won => "won",
            LeadStatus::Lost => "lost",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Lead {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub status: LeadStatus,
    pub source: String,
    pub value: f64,
    pub notes: String,
    pub assigned_to: Option<String>,
    pub created_at: Option<String>,
}

impl Entity for Lead {
    const COLLECTION: &'static str = "leads";

    fn on_create(&mut self) {
        if self.created_at.as_deref().map_or(true, str::is_empty) {
            self.created_at = Some(chrono::Utc::now().to_rfc3339());
        }
    }
}

/// Denormalized `{id, name}` reference, e.g. an employee's department.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamedRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EmploymentStatus { #[default] Active, OnLeave, Terminated }

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Employee {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub position: String,
    pub role: Option<Role>,
    pub department: Option<NamedRef>,
    pub salary: f64,
    pub hire_date: Option<String>,
    pub status: EmploymentStatus,
}

impl Entity for Employee { const COLLECTION: &'static str = "employees"; }

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProjectStatus { #[default] Planning, Active, OnHold, Completed, Cancelled }

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    pub description: String,
    pub client_name: String,
    pub status: ProjectStatus,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub budget: f64,
    pub team_members: Vec<String>,
}

impl Entity for Project { const COLLECTION: &'static str = "projects"; }

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InvoiceItem {
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvoiceStatus { #[default] Draft, Sent, Paid, Overdue, Cancelled }

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Invoice {
    pub invoice_number: String,
    pub client_name: String,
    pub client_email: String,
    pub items: Vec<InvoiceItem>,
    /// Tax rate in percent.
    pub tax: f64,
    pub status: InvoiceStatus,
    pub issue_date: Option<String>,
    pub due_date: Option<String>,
    pub notes: String,
}

impl Invoice {
    pub fn subtotal(&self) -> f64 {
        self.items.iter().map(|i| i.quantity * i.unit_price).sum()
    }

    pub fn total(&self) -> f64 {
        self.subtotal() * (1.0 + self.tax / 100.0)
    }
}

impl Entity for Invoice { const COLLECTION: &'static str = "invoices"; }

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Department {
    pub name: String,
    pub description: String,
    pub manager_id: Option<String>,
}

impl Entity for Department { const COLLECTION: &'static str = "departments"; }

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus { #[default] Todo, InProgress, Review, Done }

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskPriority { Low, #[default] Medium, High, Urgent }

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Task {
    pub title: String,
    pub description: String,
    pub project_id: Option<String>,
    pub assignee_id: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<String>,
}

impl Entity for Task { const COLLECTION: &'static str = "tasks"; }

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LicenseStatus { #[default] Active, Suspended, Expired }

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct License {
    pub tenant_id: String,
    pub tier_id: Option<String>,
    pub status: LicenseStatus,
    pub issued_at: Option<String>,
    pub expires_at: Option<String>,
    pub seats: u32,
}

impl Entity for License { const COLLECTION: &'static str = "licenses"; }

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Tier {
    pub name: String,
    pub price: f64,
    pub max_users: u32,
    pub features: Vec<String>,
}

impl Entity for Tier { const COLLECTION: &'static str = "tiers"; }

/// Application profile keyed by identity uid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserProfile {
    pub email: String,
    pub display_name: String,
    pub role: Option<Role>,
}

impl Entity for UserProfile { const COLLECTION: &'static str = crate::identity::PROFILES_COLLECTION; }
