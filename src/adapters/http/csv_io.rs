//! CSV input/output for the bulk endpoints. Uses the `csv` crate for safe
//! parsing and quoting.
//!
//! Upload side: finds the phone column (and optional name column) by header
//! alias, case-insensitive, and turns rows into the "name phone" input lines
//! the parser understands. Download side: renders job results with fixed
//! columns; record-level errors render ERROR,ERROR statuses.

use crate::domain::{DomainError, PerNumberResult, ValidationResult};

/// Accepted phone column headers (case-insensitive).
pub const PHONE_HEADERS: &[&str] = &["phone_number", "nomor", "phone", "no_hp", "telepon"];

/// Accepted name/identifier column headers (case-insensitive).
pub const NAME_HEADERS: &[&str] = &["name", "nama", "identifier", "username"];

/// Extract raw phone input lines from an uploaded CSV.
///
/// Rows with a name column become `"<name> <phone>"` so the batch parser
/// attaches the identifier; empty phone cells are skipped.
pub fn extract_phone_inputs(data: &[u8]) -> Result<Vec<String>, DomainError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let headers = reader
        .headers()
        .map_err(|e| DomainError::InvalidInput(format!("unreadable CSV header: {e}")))?
        .clone();

    let find_column = |aliases: &[&str]| -> Option<usize> {
        headers
            .iter()
            .position(|h| aliases.iter().any(|a| h.eq_ignore_ascii_case(a)))
    };

    let Some(phone_col) = find_column(PHONE_HEADERS) else {
        return Err(DomainError::InvalidInput(format!(
            "no phone column found; accepted headers: {}",
            PHONE_HEADERS.join("|")
        )));
    };
    let name_col = find_column(NAME_HEADERS);

    let mut inputs = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| DomainError::InvalidInput(format!("unreadable CSV row: {e}")))?;
        let phone = record.get(phone_col).unwrap_or("").trim();
        if phone.is_empty() {
            continue;
        }
        let name = name_col.and_then(|c| record.get(c)).unwrap_or("").trim();
        if name.is_empty() {
            inputs.push(phone.to_string());
        } else {
            inputs.push(format!("{name} {phone}"));
        }
    }

    Ok(inputs)
}

fn status_cell(result: &Option<ValidationResult>) -> String {
    result
        .as_ref()
        .map(|r| r.status.as_str().to_string())
        .unwrap_or_default()
}

fn details_cell(result: &Option<ValidationResult>) -> String {
    match result {
        Some(r) if r.error.is_some() => r.error.clone().unwrap_or_default(),
        Some(r) if !r.details.is_empty() => {
            serde_json::to_string(&r.details).unwrap_or_default()
        }
        _ => String::new(),
    }
}

/// Render job result details as the downloadable CSV.
pub fn render_results_csv(details: &[PerNumberResult]) -> Result<String, DomainError> {
    let mut wtr = csv::WriterBuilder::new().from_writer(Vec::new());

    wtr.write_record([
        "identifier",
        "phone_number",
        "original_phone",
        "whatsapp_status",
        "telegram_status",
        "whatsapp_details",
        "telegram_details",
        "processed_at",
    ])
    .map_err(|e| DomainError::Store(e.to_string()))?;

    for detail in details {
        let identifier = detail.identifier.clone().unwrap_or_default();
        let processed_at = detail.processed_at.to_rfc3339();

        let row = if let Some(error) = &detail.error {
            [
                identifier,
                detail.phone_number.clone(),
                detail.original_input.clone(),
                "ERROR".to_string(),
                "ERROR".to_string(),
                error.clone(),
                error.clone(),
                processed_at,
            ]
        } else {
            [
                identifier,
                detail.phone_number.clone(),
                detail.original_input.clone(),
                status_cell(&detail.whatsapp),
                status_cell(&detail.telegram),
                details_cell(&detail.whatsapp),
                details_cell(&detail.telegram),
                processed_at,
            ]
        };
        wtr.write_record(&row)
            .map_err(|e| DomainError::Store(e.to_string()))?;
    }

    wtr.flush().map_err(|e| DomainError::Store(e.to_string()))?;
    let bytes = wtr
        .into_inner()
        .map_err(|e| DomainError::Store(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| DomainError::Store(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Platform, ValidationStatus};
    use chrono::Utc;

    #[test]
    fn finds_phone_column_by_any_alias() {
        for header in ["phone_number", "NOMOR", "Phone", "no_hp", "Telepon"] {
            let data = format!("{header}\n08123456789\n08987654321\n");
            let inputs = extract_phone_inputs(data.as_bytes()).unwrap();
            assert_eq!(inputs.len(), 2, "header: {header}");
        }
    }

    #[test]
    fn name_column_is_prepended() {
        let data = b"nama,nomor\nBudi,08123456789\n,08987654321\n";
        let inputs = extract_phone_inputs(data).unwrap();
        assert_eq!(inputs, vec!["Budi 08123456789", "08987654321"]);
    }

    #[test]
    fn missing_phone_column_is_a_client_error() {
        let data = b"email,address\na@b.c,somewhere\n";
        let err = extract_phone_inputs(data).unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[test]
    fn empty_phone_cells_are_skipped() {
        let data = b"phone\n08123456789\n\n   \n08987654321\n";
        let inputs = extract_phone_inputs(data).unwrap();
        assert_eq!(inputs.len(), 2);
    }

    fn detail_ok() -> PerNumberResult {
        let mut wa = ValidationResult::new(Platform::WhatsApp, ValidationStatus::Active);
        wa.details
            .insert("account_type".to_string(), "business".into());
        PerNumberResult {
            identifier: Some("Budi".to_string()),
            phone_number: "+628123456789".to_string(),
            original_input: "Budi 08123456789".to_string(),
            whatsapp: Some(wa),
            telegram: Some(ValidationResult::new(
                Platform::Telegram,
                ValidationStatus::Inactive,
            )),
            error: None,
            processed_at: Utc::now(),
        }
    }

    #[test]
    fn renders_status_and_details_columns() {
        let csv = render_results_csv(&[detail_ok()]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "identifier,phone_number,original_phone,whatsapp_status,telegram_status,whatsapp_details,telegram_details,processed_at"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("Budi,+628123456789,"));
        assert!(row.contains("active"));
        assert!(row.contains("inactive"));
        assert!(row.contains("account_type"));
    }

    #[test]
    fn record_error_renders_error_statuses() {
        let mut failed = detail_ok();
        failed.whatsapp = None;
        failed.telegram = None;
        failed.error = Some("record processing failed".to_string());

        let csv = render_results_csv(&[failed]).unwrap();
        let row = csv.lines().nth(1).unwrap();
        assert!(row.contains("ERROR,ERROR"));
        assert!(row.contains("record processing failed"));
    }

    #[test]
    fn platform_error_text_lands_in_details_column() {
        let mut failed = detail_ok();
        failed.whatsapp = Some(ValidationResult::error(
            Platform::WhatsApp,
            "connect timeout after 10s",
        ));

        let csv = render_results_csv(&[failed]).unwrap();
        let row = csv.lines().nth(1).unwrap();
        assert!(row.contains("error"));
        assert!(row.contains("connect timeout after 10s"));
    }
}
