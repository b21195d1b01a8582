// All LLM prompt constants for the optimize module.

/// System instruction for resume optimization — enforces JSON-only output.
pub const OPTIMIZE_SYSTEM: &str = "You are an expert resume writer and career coach. \
    Rewrite resumes so they target a specific job description while staying truthful \
    to the candidate's real experience. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Optimization prompt template. Replace `{base_resume}` and
/// `{job_description}` before sending.
pub const OPTIMIZE_PROMPT_TEMPLATE: &str = r#"Rewrite the resume below so it is tailored to the job description. Keep every claim truthful to the original resume: reorder, reword, and emphasize — never invent experience, employers, titles, or dates.

Return a JSON object with this EXACT schema (no extra fields):
{
  "optimizedResume": "the full rewritten resume as plain text",
  "changesSummary": "a concise summary of what was changed and why"
}

Rules:
1. Mirror the job description's key terminology where the resume genuinely supports it
2. Lead with the experience most relevant to this role
3. Keep the resume's original factual content intact — no fabrication
4. `optimizedResume` must contain the complete resume, not a fragment
5. `changesSummary` must name the concrete edits (reordering, rewording, emphasis)

RESUME:
{base_resume}

JOB DESCRIPTION:
{job_description}"#;
