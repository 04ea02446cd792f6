//! The canonical persisted shape of a résumé document (current schema).
//!
//! Optional fields are `None` rather than empty strings so the stored JSON
//! carries `null` for anything the user left out.

use serde::{Deserialize, Serialize};

/// Written into every document we persist. Older rows carry no version.
pub const SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeDocument {
    pub schema_version: u32,
    pub personal_info: PersonalInfo,
    pub summary: Option<String>,
    pub education: Vec<Education>,
    pub experience: Vec<Experience>,
    pub skills: Vec<Skill>,
    pub languages: Vec<Language>,
    pub hobbies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInfo {
    pub full_name: Option<String>,
    pub job_title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Education {
    pub institution: Option<String>,
    pub degree: Option<String>,
    pub field_of_study: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experience {
    pub company: Option<String>,
    pub position: Option<String>,
    pub location: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Language {
    pub name: Option<String>,
    pub level: Option<String>,
}

impl ResumeDocument {
    /// True when no field carries any content. The ingestion worker fails an
    /// attempt whose extraction is blank.
    pub fn is_blank(&self) -> bool {
        let info = &self.personal_info;
        [
            &info.full_name,
            &info.job_title,
            &info.email,
            &info.phone,
            &info.address,
            &self.summary,
        ]
        .iter()
        .all(|v| v.is_none())
            && self.education.is_empty()
            && self.experience.is_empty()
            && self.skills.is_empty()
            && self.languages.is_empty()
            && self.hobbies.is_empty()
    }
}
