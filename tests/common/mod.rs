//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const HEADER: &str = "customerID,gender,SeniorCitizen,Partner,Dependents,tenure,PhoneService,\
MultipleLines,InternetService,OnlineSecurity,OnlineBackup,DeviceProtection,TechSupport,\
StreamingTV,StreamingMovies,Contract,PaperlessBilling,PaymentMethod,MonthlyCharges,\
TotalCharges,Churn";

const CONTRACTS: [&str; 3] = ["Month-to-month", "One year", "Two year"];
const INTERNET: [&str; 3] = ["DSL", "Fiber optic", "No"];
const PAYMENTS: [&str; 4] = [
    "Bank transfer (automatic)",
    "Credit card (automatic)",
    "Electronic check",
    "Mailed check",
];

/// Write a deterministic Telco-style customer table
///
/// Short month-to-month contracts churn; every `blank_every`-th row has a
/// blank TotalCharges cell and is dropped by cleaning.
pub fn write_telco_csv(path: &Path, rows: usize, blank_every: usize) {
    let mut out = BufWriter::new(File::create(path).unwrap());
    writeln!(out, "{HEADER}").unwrap();

    for i in 0..rows {
        let yes_no = |k: usize| if (i / k) % 2 == 0 { "No" } else { "Yes" };
        let contract = CONTRACTS[(i * 7) % 3];
        let internet = INTERNET[(i * 5) % 3];
        let addon = |k: usize| {
            if internet == "No" {
                "No internet service"
            } else {
                yes_no(k)
            }
        };
        let phone = yes_no(3);
        let lines = if phone == "No" { "No phone service" } else { yes_no(5) };
        let tenure = (i * 11) % 72;
        let monthly = 20.0 + ((i * 17) % 90) as f64 + 0.25;
        let total = if blank_every > 0 && i % blank_every == blank_every - 1 {
            " ".to_string()
        } else {
            format!("{:.2}", monthly * tenure.max(1) as f64)
        };
        let churn = contract == "Month-to-month" && tenure < 24;

        writeln!(
            out,
            "{:04}-TEST,{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{:.2},{},{}",
            i,
            if i % 2 == 0 { "Female" } else { "Male" },
            (i / 7) % 2,
            yes_no(2),
            yes_no(4),
            tenure,
            phone,
            lines,
            internet,
            addon(6),
            addon(8),
            addon(9),
            addon(10),
            addon(12),
            addon(13),
            contract,
            yes_no(14),
            PAYMENTS[(i * 3) % 4],
            monthly,
            total,
            if churn { "Yes" } else { "No" },
        )
        .unwrap();
    }
    out.flush().unwrap();
}

/// The sample customer as a JSON request body of numeric codes
pub fn sample_request() -> serde_json::Value {
    serde_json::json!({
        "gender": 1, "SeniorCitizen": 0, "Partner": 1, "Dependents": 0,
        "tenure": 12, "PhoneService": 1, "MultipleLines": 0, "InternetService": 2,
        "OnlineSecurity": 1, "OnlineBackup": 0, "DeviceProtection": 1, "TechSupport": 1,
        "StreamingTV": 1, "StreamingMovies": 1, "Contract": 0, "PaperlessBilling": 1,
        "PaymentMethod": 2, "MonthlyCharges": 70.35, "TotalCharges": 845.5
    })
}
