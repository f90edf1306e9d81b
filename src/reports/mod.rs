//! # Hospital Reports
//!
//! The analyses run over the visit table. Each report is a [`BatchFold`]
//! driven through the chunked aggregator and produces one result table.
//!
//! [`BatchFold`]: crate::aggregation::BatchFold

pub mod anomalies;
pub mod kpi;
pub mod runner;
pub mod visits;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use anomalies::{quantile, OutlierBounds, ThresholdFilter, ValueDistribution};
pub use kpi::{KpiSnapshot, KpiState, KpiSummary};
pub use runner::{ReportRunner, ReportSummary};
pub use visits::{visit_types_table, VisitType};

/// Reports known to the runner, in default execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    KpiSummary,
    DepartmentRevenue,
    DoctorRevenue,
    TopDoctors,
    DepartmentFeedback,
    PaymentModeSummary,
    PatientsPerDepartment,
    MonthlyRevenue,
    PatientVisitTypes,
    AmountAnomalies,
}

impl ReportKind {
    pub fn all() -> &'static [ReportKind] {
        &[
            ReportKind::KpiSummary,
            ReportKind::DepartmentRevenue,
            ReportKind::DoctorRevenue,
            ReportKind::TopDoctors,
            ReportKind::DepartmentFeedback,
            ReportKind::PaymentModeSummary,
            ReportKind::PatientsPerDepartment,
            ReportKind::MonthlyRevenue,
            ReportKind::PatientVisitTypes,
            ReportKind::AmountAnomalies,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::KpiSummary => "kpi_summary",
            ReportKind::DepartmentRevenue => "department_revenue",
            ReportKind::DoctorRevenue => "doctor_revenue",
            ReportKind::TopDoctors => "top_doctors",
            ReportKind::DepartmentFeedback => "department_feedback",
            ReportKind::PaymentModeSummary => "payment_mode_summary",
            ReportKind::PatientsPerDepartment => "patients_per_department",
            ReportKind::MonthlyRevenue => "monthly_revenue",
            ReportKind::PatientVisitTypes => "patient_visit_types",
            ReportKind::AmountAnomalies => "amount_anomalies",
        }
    }

    /// Output table used when the configuration names none
    pub fn default_table_name(&self) -> &'static str {
        match self {
            ReportKind::KpiSummary => "Hospital_KPI_Summary",
            ReportKind::DepartmentRevenue => "Hospital_Dept_Revenue",
            ReportKind::DoctorRevenue => "Hospital_Doctor_Revenue",
            ReportKind::TopDoctors => "Hospital_Top_Doctors",
            ReportKind::DepartmentFeedback => "Hospital_Dept_Feedback",
            ReportKind::PaymentModeSummary => "Hospital_Payment_Summary",
            ReportKind::PatientsPerDepartment => "Hospital_Dept_Patient_Counts",
            ReportKind::MonthlyRevenue => "Hospital_Monthly_Revenue",
            ReportKind::PatientVisitTypes => "Hospital_Patient_Visit_Types",
            ReportKind::AmountAnomalies => "Hospital_Anomalies",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ReportKind::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| {
                let known: Vec<&str> = ReportKind::all().iter().map(|k| k.as_str()).collect();
                format!("unknown report '{s}', expected one of: {}", known.join(", "))
            })
    }
}
