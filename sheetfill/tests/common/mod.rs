#![allow(dead_code)]

use rust_xlsxwriter::Workbook;
use sheetfill::platforms::memory::{ComboBox, MemoryPage, NodeId};

pub const HEADER: [&str; 6] = [
    "Full Name",
    "Mobile No",
    "Identity No",
    "Tourist Type",
    "Select Identity Proof",
    "Select Gender",
];

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sheetfill=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// An xlsx file with [`HEADER`] and one row per entry. Empty strings leave
/// the cell blank; all-digit values are written as numbers.
pub fn workbook(rows: &[[&str; 6]]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, label) in HEADER.iter().enumerate() {
        sheet.write_string(0, col as u16, *label).unwrap();
    }
    for (r, row) in rows.iter().enumerate() {
        let r = r as u32 + 1;
        for (col, value) in row.iter().enumerate() {
            let col = col as u16;
            if value.is_empty() {
                continue;
            }
            if value.chars().all(|c| c.is_ascii_digit()) {
                sheet.write_number(r, col, value.parse::<f64>().unwrap()).unwrap();
            } else {
                sheet.write_string(r, col, *value).unwrap();
            }
        }
    }
    workbook.save_to_buffer().unwrap()
}

pub fn three_tourists() -> Vec<u8> {
    workbook(&[
        ["Asha Rao", "9876543210", "P1234567", "Domestic", "Passport", "Female"],
        ["Ben Ode", "", "X9988", "Foreign", "Passport", "Male"],
        ["Chen Li", "9123456780", "A55", "domestic", "Aadhaar Card", "Other"],
    ])
}

/// Handles to the interesting nodes of [`registration_page`]
pub struct Form {
    pub full_name: NodeId,
    pub mobile: NodeId,
    pub identity: NodeId,
    pub tourist_type: NodeId,
    pub identity_proof: NodeId,
    pub gender: NodeId,
}

/// The tourist registration form: three text inputs, then Tourist Type,
/// with Identity Proof and Gender appearing once Tourist Type is chosen
pub fn registration_page() -> (MemoryPage, Form) {
    let page = MemoryPage::new().with_url("https://register.example/tourist");
    let full_name = page.add_text_input("Enter Full name");
    let mobile = page.add_text_input("Enter Mobile No.");
    let identity = page.add_text_input("Enter Identity No.");
    let tourist_type = page.add_combobox(ComboBox::new(["Domestic", "Foreign"]));
    let identity_proof = page.add_combobox(
        ComboBox::new(["Passport", "Aadhaar Card", "Driving Licence"]).revealed_by(tourist_type),
    );
    let gender =
        page.add_combobox(ComboBox::new(["Male", "Female", "Other"]).revealed_by(tourist_type));
    page.add_element(None, "input", &[("type", "submit")], "");
    (
        page,
        Form {
            full_name,
            mobile,
            identity,
            tourist_type,
            identity_proof,
            gender,
        },
    )
}
