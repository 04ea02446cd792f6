pub const ENHANCE_SYSTEM: &str = "You are a professional CV editor for the Arab job market. \
    You rewrite CV text to be concise, achievement-oriented and professional. \
    Reply with the rewritten text only: no preamble, no quotes, no markdown.";

/// `{text}` and `{job_context}` are substituted.
pub const ENHANCE_PROMPT: &str = "\
Rewrite the following CV text so it reads clearly and professionally.
Keep every fact; do not add achievements, numbers or employers that are not in the text.
{job_context}
Text:
{text}";

pub const JOB_CONTEXT: &str = "Tailor wording to this target role: {job_description}\n";

pub const SKILLS_SYSTEM: &str = "You are a careers adviser.";

/// `{job_title}` is substituted.
pub const SKILLS_PROMPT: &str = r#"List the most relevant skills for the job title "{job_title}".
Return JSON of the form {"skills": ["...", "..."]} with at most 8 short skill names,
most important first."#;

pub const SUMMARY_SYSTEM: &str = "You are a professional CV writer. \
    Reply with the summary text only: no preamble, no quotes, no markdown.";

/// `{job_title}` is substituted.
pub const SUMMARY_PROMPT: &str = "\
Write a professional CV summary of two to three sentences for a candidate whose \
target job title is \"{job_title}\". Do not invent employers, degrees or years of experience.";
