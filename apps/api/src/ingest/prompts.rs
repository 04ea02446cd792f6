pub const EXTRACT_SYSTEM: &str = "You are an expert CV parser for Arabic and bilingual \
    Arabic/English résumés.";

/// Field extraction prompt. `{cv_text}` is replaced with the document text.
pub const EXTRACT_PROMPT: &str = r#"Extract the candidate's details from the CV text below.

Return a single JSON object with exactly this shape:
{
  "personalInfo": {
    "fullName": "", "jobTitle": "", "email": "", "phone": "", "address": ""
  },
  "summary": "",
  "education": [
    { "institution": "", "degree": "", "fieldOfStudy": "",
      "startDate": "", "endDate": "", "description": "" }
  ],
  "experience": [
    { "company": "", "position": "", "location": "",
      "startDate": "", "endDate": "", "description": "" }
  ],
  "skills": [ { "name": "" } ],
  "languages": [ { "name": "", "level": "" } ],
  "hobbies": [ "" ]
}

Rules:
- Keep the original language of every value; do not translate.
- Dates as written in the CV (for example "2019" or "03/2021"); "" if absent.
- Omit array entries you cannot fill; never repeat the template's empty rows.

CV text:
"""
{cv_text}
""""#;
