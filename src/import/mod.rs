//! Bulk CSV import of tickets, managers and business units.
//!
//! The file type is auto-detected from the header row; headers may be
//! in English or Russian (operations exports both). Imported tickets
//! are announced on the event bus and queued for background
//! enrichment.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use diesel::prelude::*;
use log::info;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::events::TicketEvent;
use crate::shared::models::{BusinessUnit, Manager, Ticket};
use crate::shared::schema::{business_units, managers, tickets};
use crate::shared::state::AppState;
use crate::tickets::spawn_enrichment;

type HandlerError = (StatusCode, String);

#[derive(Debug, Default, Serialize)]
pub struct ImportResult {
    #[serde(rename = "type")]
    pub file_type: String,
    pub total: usize,
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub imported_ids: Vec<Uuid>,
}

/// Map English and Russian CSV headers to canonical keys. The raw
/// lowercased header is kept as well so exact column names also work.
pub fn map_columns(headers: &csv::StringRecord) -> HashMap<String, usize> {
    let aliases: &[(&str, &str)] = &[
        // Business units
        ("офис", "name"),
        ("адрес", "address"),
        // Managers
        ("фио", "full_name"),
        ("должность", "position"),
        ("навыки", "skills"),
        ("количество обращений в работе", "current_load"),
        // Tickets
        ("guid клиента", "external_id"),
        ("описание", "body"),
        ("вложения", "attachments"),
        ("сегмент клиента", "client_segment"),
        ("страна", "country"),
        ("область", "region"),
        ("населённый пункт", "city"),
        ("улица", "street"),
        ("дом", "house"),
    ];

    let mut map = HashMap::new();
    for (i, column) in headers.iter().enumerate() {
        let key = column
            .trim_start_matches('\u{feff}')
            .trim()
            .to_lowercase();
        if let Some((_, canonical)) = aliases.iter().find(|(alias, _)| *alias == key) {
            map.insert((*canonical).to_string(), i);
        }
        map.insert(key, i);
    }
    map
}

/// Guess the CSV kind from which known columns are present.
pub fn detect_file_type(columns: &HashMap<String, usize>) -> &'static str {
    if columns.contains_key("body")
        || columns.contains_key("external_id")
        || columns.contains_key("client_segment")
    {
        return "tickets";
    }
    if columns.contains_key("full_name")
        || columns.contains_key("skills")
        || columns.contains_key("current_load")
    {
        return "managers";
    }
    if columns.contains_key("address") {
        return "business_units";
    }
    "unknown"
}

fn get_col(record: &csv::StringRecord, columns: &HashMap<String, usize>, key: &str) -> String {
    columns
        .get(key)
        .and_then(|idx| record.get(*idx))
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

/// Join non-empty address parts with commas, preserving part order so
/// the classifier can rely on "country, region, city, street, house".
pub fn compose_address(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

/// First meaningful body line, shortened to a subject.
pub fn generate_subject(body: &str) -> String {
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let chars: Vec<char> = line.chars().collect();
        if chars.len() > 100 {
            let mut subject: String = chars[..97].iter().collect();
            subject.push_str("...");
            return subject;
        }
        return line.to_string();
    }
    "Обращение клиента".to_string()
}

fn csv_reader(data: &[u8]) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(data)
}

pub fn parse_tickets(data: &[u8], result: &mut ImportResult) -> Vec<Ticket> {
    let mut reader = csv_reader(data);
    let columns = match reader.headers() {
        Ok(headers) => map_columns(headers),
        Err(_) => return Vec::new(),
    };

    let mut parsed = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let line_num = line + 2;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                result.errors.push(format!("line {}: {}", line_num, e));
                continue;
            }
        };

        let now = chrono::Utc::now();
        let body = get_col(&record, &columns, "body");
        let mut subject = get_col(&record, &columns, "subject");
        if subject.is_empty() && !body.is_empty() {
            subject = generate_subject(&body);
        }

        let raw_address = {
            let direct = get_col(&record, &columns, "raw_address");
            if direct.is_empty() {
                let country = get_col(&record, &columns, "country");
                let region = get_col(&record, &columns, "region");
                let city = get_col(&record, &columns, "city");
                let street = get_col(&record, &columns, "street");
                let house = get_col(&record, &columns, "house");
                compose_address(&[
                    country.as_str(),
                    region.as_str(),
                    city.as_str(),
                    street.as_str(),
                    house.as_str(),
                ])
            } else {
                direct
            }
        };

        let attachments = get_col(&record, &columns, "attachments");

        let mut ticket = Ticket {
            id: Uuid::new_v4(),
            external_id: non_empty(get_col(&record, &columns, "external_id")),
            subject,
            body,
            client_name: non_empty(get_col(&record, &columns, "client_name")),
            client_segment: non_empty(get_col(&record, &columns, "client_segment")),
            source_channel: non_empty(get_col(&record, &columns, "source_channel"))
                .or_else(|| Some("email".to_string())),
            status: "new".to_string(),
            raw_address: non_empty(raw_address),
            attachments: non_empty(attachments),
            created_at: now,
            updated_at: now,
        };

        // Attachment-only rows still become tickets.
        if ticket.subject.is_empty() && ticket.body.is_empty() {
            match &ticket.attachments {
                Some(attachments) => {
                    ticket.subject = format!("Вложение: {}", attachments);
                    ticket.body = format!("Клиент отправил вложение: {}", attachments);
                }
                None => {
                    result
                        .errors
                        .push(format!("line {}: missing subject and body", line_num));
                    result.skipped += 1;
                    continue;
                }
            }
        }

        parsed.push(ticket);
    }
    parsed
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn import_tickets(state: &Arc<AppState>, data: &[u8]) -> Result<ImportResult, HandlerError> {
    let mut result = ImportResult {
        file_type: "tickets".to_string(),
        ..Default::default()
    };

    let parsed = parse_tickets(data, &mut result);
    result.total = parsed.len() + result.skipped;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    for ticket in parsed {
        let inserted: Result<Uuid, _> = diesel::insert_into(tickets::table)
            .values(&ticket)
            .on_conflict(tickets::external_id)
            .do_update()
            .set((
                tickets::subject.eq(&ticket.subject),
                tickets::body.eq(&ticket.body),
                tickets::client_name.eq(&ticket.client_name),
                tickets::client_segment.eq(&ticket.client_segment),
                tickets::source_channel.eq(&ticket.source_channel),
                tickets::raw_address.eq(&ticket.raw_address),
                tickets::attachments.eq(&ticket.attachments),
                tickets::updated_at.eq(ticket.updated_at),
            ))
            .returning(tickets::id)
            .get_result(&mut conn);

        match inserted {
            Ok(id) => {
                result.imported += 1;
                result.imported_ids.push(id);
            }
            Err(e) => {
                result.skipped += 1;
                result.errors.push(format!("{}: {}", ticket.subject, e));
            }
        }
    }

    Ok(result)
}

fn import_managers(state: &Arc<AppState>, data: &[u8]) -> Result<ImportResult, HandlerError> {
    let mut result = ImportResult {
        file_type: "managers".to_string(),
        ..Default::default()
    };

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    // Office name/city → id, for files that reference offices by name.
    let offices: Vec<BusinessUnit> = business_units::table
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    let mut office_map: HashMap<String, Uuid> = HashMap::new();
    for office in &offices {
        office_map.insert(office.name.clone(), office.id);
        office_map.insert(office.city.clone(), office.id);
    }

    let mut reader = csv_reader(data);
    let columns = reader
        .headers()
        .map(map_columns)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("CSV header error: {e}")))?;

    let mut parsed = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let line_num = line + 2;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                result.errors.push(format!("line {}: {}", line_num, e));
                continue;
            }
        };

        let full_name = get_col(&record, &columns, "full_name");
        if full_name.is_empty() {
            result
                .errors
                .push(format!("line {}: missing full_name", line_num));
            result.skipped += 1;
            continue;
        }

        let email = non_empty(get_col(&record, &columns, "email"))
            .unwrap_or_else(|| format!("manager{}@support.local", line_num - 1));

        let business_unit_id = {
            let explicit = get_col(&record, &columns, "business_unit_id");
            if !explicit.is_empty() {
                match Uuid::parse_str(&explicit) {
                    Ok(id) => id,
                    Err(_) => {
                        result
                            .errors
                            .push(format!("line {}: invalid business_unit_id", line_num));
                        result.skipped += 1;
                        continue;
                    }
                }
            } else {
                let office_name = get_col(&record, &columns, "name");
                match office_map.get(&office_name) {
                    Some(id) => *id,
                    None => {
                        result.errors.push(format!(
                            "line {}: office '{}' not found",
                            line_num, office_name
                        ));
                        result.skipped += 1;
                        continue;
                    }
                }
            }
        };

        // "Должность" marks chief specialists; "Навыки" carries the
        // VIP flag and extra languages.
        let position = get_col(&record, &columns, "position");
        let is_chief_spec = if !position.is_empty() {
            position.to_lowercase().contains("главный")
        } else {
            get_col(&record, &columns, "is_chief_spec").to_lowercase() == "true"
        };

        let mut is_vip_skill = false;
        let mut languages = vec!["RU".to_string()];
        let skills = get_col(&record, &columns, "skills");
        if !skills.is_empty() {
            for skill in skills.split(',') {
                match skill.trim().to_uppercase().as_str() {
                    "VIP" => is_vip_skill = true,
                    "ENG" => languages.push("EN".to_string()),
                    "KZ" => languages.push("KZ".to_string()),
                    _ => {}
                }
            }
        } else {
            is_vip_skill = get_col(&record, &columns, "is_vip_skill").to_lowercase() == "true";
            let listed = get_col(&record, &columns, "languages");
            if !listed.is_empty() {
                languages = listed.split(';').map(|l| l.trim().to_string()).collect();
            }
        }

        let current_load = get_col(&record, &columns, "current_load")
            .parse::<i32>()
            .unwrap_or(0);

        parsed.push(Manager {
            id: Uuid::new_v4(),
            full_name,
            email: Some(email),
            business_unit_id,
            is_vip_skill,
            is_chief_spec,
            languages,
            max_load: 50,
            current_load,
            is_active: true,
            created_at: chrono::Utc::now(),
        });
    }

    result.total = parsed.len() + result.skipped;

    for manager in parsed {
        let inserted = diesel::insert_into(managers::table)
            .values(&manager)
            .on_conflict(managers::email)
            .do_nothing()
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;
        if inserted > 0 {
            result.imported += 1;
        } else {
            result.skipped += 1;
        }
    }

    Ok(result)
}

fn import_business_units(state: &Arc<AppState>, data: &[u8]) -> Result<ImportResult, HandlerError> {
    let mut result = ImportResult {
        file_type: "business_units".to_string(),
        ..Default::default()
    };

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let mut reader = csv_reader(data);
    let columns = reader
        .headers()
        .map(map_columns)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("CSV header error: {e}")))?;

    let mut parsed = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let line_num = line + 2;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                result.errors.push(format!("line {}: {}", line_num, e));
                continue;
            }
        };

        let name = get_col(&record, &columns, "name");
        if name.is_empty() {
            result.errors.push(format!("line {}: missing name", line_num));
            result.skipped += 1;
            continue;
        }

        // Kazakh offices are named after their city.
        let city = non_empty(get_col(&record, &columns, "city")).unwrap_or_else(|| name.clone());

        parsed.push(BusinessUnit {
            id: Uuid::new_v4(),
            name,
            city,
            address: non_empty(get_col(&record, &columns, "address")),
            lat: get_col(&record, &columns, "lat").parse().ok(),
            lon: get_col(&record, &columns, "lon").parse().ok(),
            created_at: chrono::Utc::now(),
        });
    }

    result.total = parsed.len() + result.skipped;

    for unit in parsed {
        let inserted = diesel::insert_into(business_units::table)
            .values(&unit)
            .on_conflict(business_units::name)
            .do_update()
            .set((
                business_units::city.eq(&unit.city),
                business_units::address.eq(&unit.address),
            ))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;
        if inserted > 0 {
            result.imported += 1;
        }
    }

    Ok(result)
}

async fn read_file_field(multipart: &mut Multipart) -> Result<Vec<u8>, HandlerError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("multipart error: {e}")))?
    {
        if field.name() == Some("file") {
            let data = field
                .bytes()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, format!("file read error: {e}")))?;
            return Ok(data.to_vec());
        }
    }
    Err((StatusCode::BAD_REQUEST, "missing file field".to_string()))
}

fn announce_and_enrich(state: &Arc<AppState>, result: &ImportResult) {
    for id in &result.imported_ids {
        state.events.broadcast(&TicketEvent::ticket_update(*id, "new"));
        spawn_enrichment(state, *id);
    }
}

/// Auto-detecting import endpoint.
pub async fn import_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ImportResult>, HandlerError> {
    let data = read_file_field(&mut multipart).await?;

    let mut peek = csv_reader(&data);
    let columns = peek
        .headers()
        .map(map_columns)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("CSV header error: {e}")))?;

    let result = match detect_file_type(&columns) {
        "tickets" => import_tickets(&state, &data)?,
        "managers" => import_managers(&state, &data)?,
        "business_units" => import_business_units(&state, &data)?,
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                "unable to detect file type from CSV headers".to_string(),
            ))
        }
    };

    info!(
        "import ({}) done: {} imported, {} skipped",
        result.file_type, result.imported, result.skipped
    );
    announce_and_enrich(&state, &result);

    Ok(Json(result))
}

pub async fn import_tickets_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ImportResult>, HandlerError> {
    let data = read_file_field(&mut multipart).await?;
    let result = import_tickets(&state, &data)?;
    announce_and_enrich(&state, &result);
    Ok(Json(result))
}

pub async fn import_managers_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ImportResult>, HandlerError> {
    let data = read_file_field(&mut multipart).await?;
    Ok(Json(import_managers(&state, &data)?))
}

pub async fn import_business_units_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ImportResult>, HandlerError> {
    let data = read_file_field(&mut multipart).await?;
    Ok(Json(import_business_units(&state, &data)?))
}

pub fn configure_import_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/import", post(import_file))
        .route("/api/import/tickets", post(import_tickets_file))
        .route("/api/import/managers", post(import_managers_file))
        .route("/api/import/business-units", post(import_business_units_file))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(fields: &[&str]) -> csv::StringRecord {
        csv::StringRecord::from(fields.to_vec())
    }

    #[test]
    fn test_map_columns_russian_aliases() {
        let map = map_columns(&headers(&["GUID клиента", "Описание", "Сегмент клиента"]));
        assert_eq!(map.get("external_id"), Some(&0));
        assert_eq!(map.get("body"), Some(&1));
        assert_eq!(map.get("client_segment"), Some(&2));
    }

    #[test]
    fn test_map_columns_strips_bom() {
        let map = map_columns(&headers(&["\u{feff}Офис", "Адрес"]));
        assert_eq!(map.get("name"), Some(&0));
        assert_eq!(map.get("address"), Some(&1));
    }

    #[test]
    fn test_detect_file_type() {
        let tickets = map_columns(&headers(&["Описание", "Сегмент клиента"]));
        assert_eq!(detect_file_type(&tickets), "tickets");

        let managers = map_columns(&headers(&["ФИО", "Навыки", "Офис"]));
        assert_eq!(detect_file_type(&managers), "managers");

        let units = map_columns(&headers(&["Офис", "Адрес"]));
        assert_eq!(detect_file_type(&units), "business_units");

        let unknown = map_columns(&headers(&["a", "b"]));
        assert_eq!(detect_file_type(&unknown), "unknown");
    }

    #[test]
    fn test_compose_address_skips_empty_parts() {
        assert_eq!(
            compose_address(&["KZ", "", "Алматы", "пр. Достык", "5"]),
            "KZ, Алматы, пр. Достык, 5"
        );
        assert_eq!(compose_address(&["", ""]), "");
    }

    #[test]
    fn test_generate_subject_first_line() {
        assert_eq!(generate_subject("\n\nНе работает приложение\nвторая строка"),
            "Не работает приложение");
        assert_eq!(generate_subject(""), "Обращение клиента");

        let long = "а".repeat(150);
        let subject = generate_subject(&long);
        assert!(subject.ends_with("..."));
        assert_eq!(subject.chars().count(), 100);
    }

    #[test]
    fn test_parse_tickets_composes_address() {
        let csv_data = "GUID клиента,Описание,Сегмент клиента,Страна,Область,Населённый пункт,Улица,Дом\n\
            c1,Не могу войти в приложение,VIP,KZ,Алматинская,Алматы,Достык,5\n";
        let mut result = ImportResult::default();
        let parsed = parse_tickets(csv_data.as_bytes(), &mut result);
        assert_eq!(parsed.len(), 1);
        let t = &parsed[0];
        assert_eq!(t.external_id.as_deref(), Some("c1"));
        assert_eq!(t.raw_address.as_deref(), Some("KZ, Алматинская, Алматы, Достык, 5"));
        assert_eq!(t.client_segment.as_deref(), Some("VIP"));
        assert_eq!(t.status, "new");
        assert_eq!(t.subject, "Не могу войти в приложение");
    }

    #[test]
    fn test_parse_tickets_attachment_only_row() {
        let csv_data = "Описание,Вложения\n,screenshot.png\n";
        let mut result = ImportResult::default();
        let parsed = parse_tickets(csv_data.as_bytes(), &mut result);
        assert_eq!(parsed.len(), 1);
        assert!(parsed[0].subject.starts_with("Вложение:"));
        assert!(parsed[0].body.contains("screenshot.png"));
    }

    #[test]
    fn test_parse_tickets_empty_row_skipped() {
        let csv_data = "Описание,Вложения\n,\n";
        let mut result = ImportResult::default();
        let parsed = parse_tickets(csv_data.as_bytes(), &mut result);
        assert!(parsed.is_empty());
        assert_eq!(result.skipped, 1);
        assert_eq!(result.errors.len(), 1);
    }
}
