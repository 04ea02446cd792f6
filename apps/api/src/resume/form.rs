//! Editable form state: the fully-typed, default-filled projection of a
//! résumé record. No field is ever null; empty means "not filled in".

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormState {
    /// `None` until the form has been persisted once.
    pub record_id: Option<Uuid>,
    pub personal_info: PersonalInfoForm,
    pub summary: String,
    pub education: Vec<EducationForm>,
    pub experience: Vec<ExperienceForm>,
    pub skills: Vec<String>,
    pub languages: Vec<LanguageForm>,
    pub hobbies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonalInfoForm {
    pub full_name: String,
    pub job_title: String,
    pub email: String,
    pub phone: String,
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EducationForm {
    pub institution: String,
    pub degree: String,
    pub field_of_study: String,
    pub start_date: String,
    pub end_date: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExperienceForm {
    pub company: String,
    pub position: String,
    pub location: String,
    pub start_date: String,
    pub end_date: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LanguageForm {
    pub name: String,
    pub level: String,
}

impl EducationForm {
    pub fn is_blank(&self) -> bool {
        all_blank(&[
            &self.institution,
            &self.degree,
            &self.field_of_study,
            &self.start_date,
            &self.end_date,
            &self.description,
        ])
    }
}

impl ExperienceForm {
    pub fn is_blank(&self) -> bool {
        all_blank(&[
            &self.company,
            &self.position,
            &self.location,
            &self.start_date,
            &self.end_date,
            &self.description,
        ])
    }
}

impl LanguageForm {
    pub fn is_blank(&self) -> bool {
        all_blank(&[&self.name, &self.level])
    }
}

fn all_blank(values: &[&String]) -> bool {
    values.iter().all(|v| v.trim().is_empty())
}

/// Rejects malformed input before anything is written. Returns one message
/// per problem found.
pub fn validate_form(form: &FormState) -> Result<(), Vec<String>> {
    let mut problems = Vec::new();

    let email = form.personal_info.email.trim();
    if !email.is_empty() && !looks_like_email(email) {
        problems.push(format!("'{email}' is not a valid email address"));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

fn looks_like_email(value: &str) -> bool {
    let mut parts = value.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty() && !domain.is_empty() && !value.contains(char::is_whitespace)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_deserializes_with_missing_fields() {
        let form: FormState =
            serde_json::from_str(r#"{"personalInfo": {"fullName": "سارة"}}"#).unwrap();
        assert_eq!(form.personal_info.full_name, "سارة");
        assert!(form.record_id.is_none());
        assert!(form.education.is_empty());
    }

    #[test]
    fn test_blank_rows_ignore_whitespace() {
        let row = EducationForm {
            institution: "  ".to_string(),
            ..Default::default()
        };
        assert!(row.is_blank());
    }

    #[test]
    fn test_validate_form_rejects_bad_email() {
        let mut form = FormState::default();
        form.personal_info.email = "not-an-email".to_string();
        let problems = validate_form(&form).unwrap_err();
        assert_eq!(problems.len(), 1);

        form.personal_info.email = "a@b@c".to_string();
        assert!(validate_form(&form).is_err());
    }

    #[test]
    fn test_validate_form_accepts_empty_and_valid_email() {
        let mut form = FormState::default();
        assert!(validate_form(&form).is_ok());
        form.personal_info.email = "sara@example.com".to_string();
        assert!(validate_form(&form).is_ok());
    }
}
