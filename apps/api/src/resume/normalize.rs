//! Normalizer: maps a loosely-typed persisted record onto the editable form.
//!
//! Stored documents were written by several generations of the ingestion
//! pipeline and of the editor, so the same field can appear under different
//! keys. `migrate_document` resolves every field through one precedence table
//! (below); the current key always comes first and wins whenever it carries a
//! value. Everything downstream works on the typed `ResumeDocument`.
//!
//! `normalize` and `to_document` are inverses for any form without blank rows:
//! `normalize(to_document(form)) == form`.

use serde_json::{Map, Value};

use crate::models::resume::ResumeRecord;
use crate::models::user::Identity;
use crate::resume::document::{
    Education, Experience, Language, PersonalInfo, ResumeDocument, Skill, SCHEMA_VERSION,
};
use crate::resume::form::{EducationForm, ExperienceForm, FormState, LanguageForm, PersonalInfoForm};

// ────────────────────────────────────────────────────────────────────────────
// Precedence table: current key first, then historical spellings in the order
// they were introduced (newest first).
// ────────────────────────────────────────────────────────────────────────────

mod keys {
    pub const PERSONAL_INFO: &[&str] = &["personalInfo", "personal_info", "personal"];
    pub const FULL_NAME: &[&str] = &["fullName", "full_name", "name"];
    pub const JOB_TITLE: &[&str] = &["jobTitle", "job_title", "targetJobTitle", "title"];
    pub const EMAIL: &[&str] = &["email", "emailAddress", "mail"];
    pub const PHONE: &[&str] = &["phone", "phoneNumber", "phone_number", "mobile"];
    pub const ADDRESS: &[&str] = &["address", "location", "city"];

    pub const SUMMARY: &[&str] = &["summary", "profile", "objective", "about"];

    pub const EDUCATION: &[&str] = &["education", "educations"];
    pub const INSTITUTION: &[&str] = &["institution", "institute", "school", "university"];
    pub const DEGREE: &[&str] = &["degree", "qualification"];
    pub const FIELD_OF_STUDY: &[&str] = &["fieldOfStudy", "field_of_study", "field", "major"];

    pub const EXPERIENCE: &[&str] = &["experience", "experiences", "workExperience", "work"];
    pub const COMPANY: &[&str] = &["company", "employer", "organization"];
    pub const POSITION: &[&str] = &["position", "jobTitle", "title", "role"];
    pub const LOCATION: &[&str] = &["location", "city"];

    pub const START_DATE: &[&str] = &["startDate", "start_date", "start", "from"];
    pub const END_DATE: &[&str] = &["endDate", "end_date", "end", "to"];
    pub const DESCRIPTION: &[&str] = &["description", "details", "responsibilities"];

    pub const SKILLS: &[&str] = &["skills"];
    pub const SKILL_NAME: &[&str] = &["name", "skill", "title"];

    pub const LANGUAGES: &[&str] = &["languages"];
    pub const LANGUAGE_NAME: &[&str] = &["name", "language"];
    pub const LANGUAGE_LEVEL: &[&str] = &["level", "proficiency"];

    pub const HOBBIES: &[&str] = &["hobbies", "interests"];
    pub const HOBBY_NAME: &[&str] = &["name", "hobby", "title"];
}

// ────────────────────────────────────────────────────────────────────────────
// Record → form
// ────────────────────────────────────────────────────────────────────────────

/// Projects a record (or its absence) onto a fully-populated form. Never fails:
/// anything missing or malformed becomes its typed default.
///
/// When there is no record yet, the identity's display name and email seed
/// the personal info section.
pub fn normalize(record: Option<&ResumeRecord>, identity: &Identity) -> FormState {
    match record {
        Some(record) => {
            let mut form = to_form(&migrate_document(&record.data));
            form.record_id = Some(record.id);
            form
        }
        None => {
            let mut form = FormState::default();
            form.personal_info.full_name = identity.display_name.clone().unwrap_or_default();
            form.personal_info.email = identity.email.clone().unwrap_or_default();
            form
        }
    }
}

/// Resolves any historical document shape into the current schema.
///
/// Documents already stamped with the current schema version are read through
/// their current keys only; legacy spellings are consulted for older rows.
pub fn migrate_document(raw: &Value) -> ResumeDocument {
    let Some(root) = raw.as_object() else {
        return ResumeDocument {
            schema_version: SCHEMA_VERSION,
            ..Default::default()
        };
    };

    let current = is_current_schema(raw);
    let k = |aliases: &'static [&'static str]| if current { &aliases[..1] } else { aliases };

    // Early documents kept personal fields flat on the root object.
    let personal = pick_object(root, k(keys::PERSONAL_INFO));
    let personal_field = |aliases: &'static [&'static str]| {
        let aliases = k(aliases);
        personal
            .and_then(|p| pick_text(p, aliases))
            .or_else(|| if current { None } else { pick_text(root, aliases) })
    };

    ResumeDocument {
        schema_version: SCHEMA_VERSION,
        personal_info: PersonalInfo {
            full_name: personal_field(keys::FULL_NAME),
            job_title: personal_field(keys::JOB_TITLE),
            email: personal_field(keys::EMAIL),
            phone: personal_field(keys::PHONE),
            address: personal_field(keys::ADDRESS),
        },
        summary: pick_text(root, k(keys::SUMMARY)),
        education: pick_rows(root, k(keys::EDUCATION))
            .iter()
            .filter_map(Value::as_object)
            .map(|row| Education {
                institution: pick_text(row, k(keys::INSTITUTION)),
                degree: pick_text(row, k(keys::DEGREE)),
                field_of_study: pick_text(row, k(keys::FIELD_OF_STUDY)),
                start_date: pick_text(row, k(keys::START_DATE)),
                end_date: pick_text(row, k(keys::END_DATE)),
                description: pick_text(row, k(keys::DESCRIPTION)),
            })
            .filter(|e| {
                has_content(&[
                    &e.institution,
                    &e.degree,
                    &e.field_of_study,
                    &e.start_date,
                    &e.end_date,
                    &e.description,
                ])
            })
            .collect(),
        experience: pick_rows(root, k(keys::EXPERIENCE))
            .iter()
            .filter_map(Value::as_object)
            .map(|row| Experience {
                company: pick_text(row, k(keys::COMPANY)),
                position: pick_text(row, k(keys::POSITION)),
                location: pick_text(row, k(keys::LOCATION)),
                start_date: pick_text(row, k(keys::START_DATE)),
                end_date: pick_text(row, k(keys::END_DATE)),
                description: pick_text(row, k(keys::DESCRIPTION)),
            })
            .filter(|e| {
                has_content(&[
                    &e.company,
                    &e.position,
                    &e.location,
                    &e.start_date,
                    &e.end_date,
                    &e.description,
                ])
            })
            .collect(),
        skills: pick_rows(root, k(keys::SKILLS))
            .iter()
            .filter_map(|v| named_item(v, k(keys::SKILL_NAME)))
            .map(|name| Skill { name })
            .collect(),
        languages: pick_rows(root, k(keys::LANGUAGES))
            .iter()
            .filter_map(|v| match v {
                Value::Object(row) => Some(Language {
                    name: pick_text(row, k(keys::LANGUAGE_NAME)),
                    level: pick_text(row, k(keys::LANGUAGE_LEVEL)),
                }),
                other => scalar_text(other).map(|name| Language {
                    name: Some(name),
                    level: None,
                }),
            })
            .filter(|l| has_content(&[&l.name, &l.level]))
            .collect(),
        hobbies: pick_rows(root, k(keys::HOBBIES))
            .iter()
            .filter_map(|v| named_item(v, k(keys::HOBBY_NAME)))
            .collect(),
    }
}

/// True when the document was written in the current schema.
pub fn is_current_schema(raw: &Value) -> bool {
    raw.get("schemaVersion")
        .and_then(Value::as_u64)
        .is_some_and(|v| v >= u64::from(SCHEMA_VERSION))
}

fn to_form(doc: &ResumeDocument) -> FormState {
    let info = &doc.personal_info;
    FormState {
        record_id: None,
        personal_info: PersonalInfoForm {
            full_name: or_empty(&info.full_name),
            job_title: or_empty(&info.job_title),
            email: or_empty(&info.email),
            phone: or_empty(&info.phone),
            address: or_empty(&info.address),
        },
        summary: or_empty(&doc.summary),
        education: doc
            .education
            .iter()
            .map(|e| EducationForm {
                institution: or_empty(&e.institution),
                degree: or_empty(&e.degree),
                field_of_study: or_empty(&e.field_of_study),
                start_date: or_empty(&e.start_date),
                end_date: or_empty(&e.end_date),
                description: or_empty(&e.description),
            })
            .collect(),
        experience: doc
            .experience
            .iter()
            .map(|e| ExperienceForm {
                company: or_empty(&e.company),
                position: or_empty(&e.position),
                location: or_empty(&e.location),
                start_date: or_empty(&e.start_date),
                end_date: or_empty(&e.end_date),
                description: or_empty(&e.description),
            })
            .collect(),
        skills: doc.skills.iter().map(|s| s.name.clone()).collect(),
        languages: doc
            .languages
            .iter()
            .map(|l| LanguageForm {
                name: or_empty(&l.name),
                level: or_empty(&l.level),
            })
            .collect(),
        hobbies: doc.hobbies.clone(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Form → document
// ────────────────────────────────────────────────────────────────────────────

/// Maps the form back onto the persisted shape: empty strings become `None`
/// and rows without any populated field are dropped.
pub fn to_document(form: &FormState) -> ResumeDocument {
    let info = &form.personal_info;
    ResumeDocument {
        schema_version: SCHEMA_VERSION,
        personal_info: PersonalInfo {
            full_name: non_empty(&info.full_name),
            job_title: non_empty(&info.job_title),
            email: non_empty(&info.email),
            phone: non_empty(&info.phone),
            address: non_empty(&info.address),
        },
        summary: non_empty(&form.summary),
        education: form
            .education
            .iter()
            .filter(|e| !e.is_blank())
            .map(|e| Education {
                institution: non_empty(&e.institution),
                degree: non_empty(&e.degree),
                field_of_study: non_empty(&e.field_of_study),
                start_date: non_empty(&e.start_date),
                end_date: non_empty(&e.end_date),
                description: non_empty(&e.description),
            })
            .collect(),
        experience: form
            .experience
            .iter()
            .filter(|e| !e.is_blank())
            .map(|e| Experience {
                company: non_empty(&e.company),
                position: non_empty(&e.position),
                location: non_empty(&e.location),
                start_date: non_empty(&e.start_date),
                end_date: non_empty(&e.end_date),
                description: non_empty(&e.description),
            })
            .collect(),
        skills: form
            .skills
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|name| Skill { name: name.clone() })
            .collect(),
        languages: form
            .languages
            .iter()
            .filter(|l| !l.is_blank())
            .map(|l| Language {
                name: non_empty(&l.name),
                level: non_empty(&l.level),
            })
            .collect(),
        hobbies: form
            .hobbies
            .iter()
            .filter(|h| !h.trim().is_empty())
            .cloned()
            .collect(),
    }
}

/// The form as the JSON object stored in a record's `data` column.
pub fn to_document_value(form: &FormState) -> Result<Value, serde_json::Error> {
    serde_json::to_value(to_document(form))
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

fn pick_object<'a>(obj: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Map<String, Value>> {
    aliases.iter().find_map(|key| obj.get(*key).and_then(Value::as_object))
}

/// First alias holding a usable value wins.
fn pick_text(obj: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|key| obj.get(*key).and_then(scalar_text))
}

/// First alias holding a non-empty array wins.
fn pick_rows<'a>(obj: &'a Map<String, Value>, aliases: &[&str]) -> &'a [Value] {
    aliases
        .iter()
        .find_map(|key| {
            obj.get(*key)
                .and_then(Value::as_array)
                .filter(|rows| !rows.is_empty())
        })
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Accepts both `"Rust"` and `{"name": "Rust"}`.
fn named_item(value: &Value, aliases: &[&str]) -> Option<String> {
    let name = match value {
        Value::Object(obj) => pick_text(obj, aliases),
        other => scalar_text(other),
    };
    name.filter(|n| !n.trim().is_empty())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        // Bulleted descriptions were once stored as arrays of lines.
        Value::Array(items) => {
            let lines: Vec<String> = items.iter().filter_map(scalar_text).collect();
            if lines.is_empty() {
                None
            } else {
                Some(lines.join("\n"))
            }
        }
        _ => None,
    }
}

fn has_content(fields: &[&Option<String>]) -> bool {
    fields
        .iter()
        .any(|f| f.as_deref().is_some_and(|v| !v.trim().is_empty()))
}

fn or_empty(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn record_with(data: Value) -> ResumeRecord {
        let now = Utc::now();
        ResumeRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            data,
            parsing_done: true,
            parsing_error: None,
            storage_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn identity() -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            display_name: Some("ليلى حسن".to_string()),
            email: Some("layla@example.com".to_string()),
        }
    }

    fn sample_form() -> FormState {
        FormState {
            record_id: Some(Uuid::new_v4()),
            personal_info: PersonalInfoForm {
                full_name: "ليلى حسن".to_string(),
                job_title: "مهندسة برمجيات".to_string(),
                email: "layla@example.com".to_string(),
                phone: String::new(),
                address: "عمّان".to_string(),
            },
            summary: "خبرة خمس سنوات في تطوير الأنظمة".to_string(),
            education: vec![EducationForm {
                institution: "الجامعة الأردنية".to_string(),
                degree: "بكالوريوس".to_string(),
                start_date: "2014".to_string(),
                end_date: "2018".to_string(),
                ..Default::default()
            }],
            experience: vec![ExperienceForm {
                company: "شركة النور".to_string(),
                position: "مطورة".to_string(),
                description: "بناء خدمات الدفع".to_string(),
                ..Default::default()
            }],
            skills: vec!["Rust".to_string(), "SQL".to_string()],
            languages: vec![LanguageForm {
                name: "العربية".to_string(),
                level: "اللغة الأم".to_string(),
            }],
            hobbies: vec!["القراءة".to_string()],
        }
    }

    #[test]
    fn test_missing_record_seeds_from_identity() {
        let form = normalize(None, &identity());
        assert_eq!(form.personal_info.full_name, "ليلى حسن");
        assert_eq!(form.personal_info.email, "layla@example.com");
        assert!(form.record_id.is_none());
        assert!(form.summary.is_empty());
        assert!(form.skills.is_empty());
    }

    #[test]
    fn test_existing_record_does_not_seed_from_identity() {
        let form = normalize(Some(&record_with(json!({}))), &identity());
        assert!(form.personal_info.full_name.is_empty());
    }

    #[test]
    fn test_null_and_malformed_fields_become_defaults() {
        let record = record_with(json!({
            "personalInfo": { "fullName": null, "email": 42 },
            "summary": null,
            "education": "not an array",
            "skills": null
        }));
        let form = normalize(Some(&record), &identity());
        assert_eq!(form.record_id, Some(record.id));
        assert!(form.personal_info.full_name.is_empty());
        assert_eq!(form.personal_info.email, "42");
        assert!(form.summary.is_empty());
        assert!(form.education.is_empty());
        assert!(form.skills.is_empty());
    }

    #[test]
    fn test_non_object_document_is_empty_form() {
        let form = normalize(Some(&record_with(Value::Null)), &identity());
        assert_eq!(form.personal_info, PersonalInfoForm::default());
    }

    #[test]
    fn test_legacy_field_names_are_read() {
        let record = record_with(json!({
            "education": [{ "institute": "جامعة دمشق", "start": "2010", "end": "2014" }],
            "experience": [{ "employer": "مؤسسة الأمل", "role": "محاسب", "from": "2015" }]
        }));
        let form = normalize(Some(&record), &identity());
        assert_eq!(form.education[0].institution, "جامعة دمشق");
        assert_eq!(form.education[0].start_date, "2010");
        assert_eq!(form.education[0].end_date, "2014");
        assert_eq!(form.experience[0].company, "مؤسسة الأمل");
        assert_eq!(form.experience[0].position, "محاسب");
        assert_eq!(form.experience[0].start_date, "2015");
    }

    #[test]
    fn test_current_name_wins_over_legacy_name() {
        let record = record_with(json!({
            "education": [{
                "institution": "الجامعة الأمريكية",
                "institute": "اسم قديم",
                "startDate": "2019",
                "start": "2001"
            }]
        }));
        let form = normalize(Some(&record), &identity());
        assert_eq!(form.education[0].institution, "الجامعة الأمريكية");
        assert_eq!(form.education[0].start_date, "2019");
    }

    #[test]
    fn test_empty_current_name_falls_back_to_legacy() {
        let record = record_with(json!({
            "education": [{ "institution": "", "institute": "معهد التقنية" }]
        }));
        let form = normalize(Some(&record), &identity());
        assert_eq!(form.education[0].institution, "معهد التقنية");
    }

    #[test]
    fn test_current_schema_ignores_legacy_spellings() {
        let record = record_with(json!({
            "schemaVersion": SCHEMA_VERSION,
            "name": "عمر",
            "personalInfo": { "fullName": null },
            "summary": null,
            "profile": "ملخص قديم",
            "education": [],
            "educations": [{ "institute": "جامعة دمشق" }]
        }));
        let form = normalize(Some(&record), &identity());
        assert!(form.personal_info.full_name.is_empty());
        assert!(form.summary.is_empty());
        assert!(form.education.is_empty());
    }

    #[test]
    fn test_schema_version_detection() {
        assert!(is_current_schema(&json!({ "schemaVersion": SCHEMA_VERSION })));
        assert!(!is_current_schema(&json!({ "schemaVersion": 1 })));
        assert!(!is_current_schema(&json!({ "name": "عمر" })));
        assert!(!is_current_schema(&Value::Null));
    }

    #[test]
    fn test_flat_legacy_personal_info() {
        let record = record_with(json!({ "name": "عمر", "phoneNumber": "+962700000000" }));
        let form = normalize(Some(&record), &identity());
        assert_eq!(form.personal_info.full_name, "عمر");
        assert_eq!(form.personal_info.phone, "+962700000000");
    }

    #[test]
    fn test_blank_rows_are_dropped_from_every_array() {
        let record = record_with(json!({
            "education": [{ "institution": null, "degree": "" }, { "degree": "ماجستير" }],
            "experience": [{ "company": "   " }],
            "skills": ["", { "name": null }, "Python"],
            "languages": [{ "name": null, "level": null }],
            "hobbies": [" ", { "name": "السباحة" }]
        }));
        let form = normalize(Some(&record), &identity());
        assert_eq!(form.education.len(), 1);
        assert_eq!(form.education[0].degree, "ماجستير");
        assert!(form.experience.is_empty());
        assert_eq!(form.skills, vec!["Python".to_string()]);
        assert!(form.languages.is_empty());
        assert_eq!(form.hobbies, vec!["السباحة".to_string()]);
    }

    #[test]
    fn test_skills_accept_string_and_object_shapes() {
        let record = record_with(json!({
            "skills": ["Rust", { "name": "Go" }, { "skill": "Kotlin" }]
        }));
        let form = normalize(Some(&record), &identity());
        assert_eq!(form.skills, vec!["Rust", "Go", "Kotlin"]);
    }

    #[test]
    fn test_description_array_is_joined() {
        let record = record_with(json!({
            "experience": [{ "company": "X", "responsibilities": ["سطر أول", "سطر ثان"] }]
        }));
        let form = normalize(Some(&record), &identity());
        assert_eq!(form.experience[0].description, "سطر أول\nسطر ثان");
    }

    #[test]
    fn test_normalize_inverts_to_document() {
        let form = sample_form();
        let record = ResumeRecord {
            id: form.record_id.unwrap(),
            ..record_with(to_document_value(&form).unwrap())
        };
        assert_eq!(normalize(Some(&record), &identity()), form);
    }

    #[test]
    fn test_to_document_restores_nulls_and_drops_blank_rows() {
        let mut form = sample_form();
        form.education.push(EducationForm::default());
        form.skills.push("  ".to_string());

        let doc = to_document(&form);
        assert_eq!(doc.personal_info.phone, None);
        assert_eq!(doc.education.len(), 1);
        assert_eq!(doc.education[0].field_of_study, None);
        assert_eq!(doc.skills.len(), 2);

        let value = to_document_value(&form).unwrap();
        assert_eq!(value["personalInfo"]["phone"], Value::Null);
        assert_eq!(value["schemaVersion"], json!(SCHEMA_VERSION));
    }
}
