// Shared prompt fragments. Each service that needs LLM calls defines its own
// prompts.rs alongside it.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// The editor is Arabic-only; generated prose must be too.
pub const ARABIC_OUTPUT: &str = "\
    Write every piece of prose in Modern Standard Arabic. \
    Keep proper nouns, company names, product names and technical terms \
    (for example Excel, AutoCAD, Python) in their original spelling.";

/// Extraction must not invent data.
pub const NO_INVENTION: &str = "\
    CRITICAL: Only use information present in the input. \
    Do NOT infer, interpolate, or invent details. \
    If a field is not supported by the input, leave it empty.";
