//! System instruction assembly.
//!
//! The instruction sent at session setup is the assistant persona, followed by
//! the business knowledge the assistant may draw on, followed by whatever
//! runtime instructions an administrator configured.

use std::path::Path;

/// Persona and conversation rules for the voice assistant.
pub const ASSISTANT_PERSONA: &str = "\
You are the voice assistant of Astric, a software and technology solutions company. \
Speak naturally and briefly, one idea at a time, and let the caller interrupt you. \
Answer only from the company knowledge below; when you do not know something, say so \
and offer to have the team call back. \
When the caller wants to order a system or service, collect their name, phone number \
and what they need (and their address if they offer it), confirm the details back to \
them, then call `submit_customer_order` exactly once. \
Never invent prices that are not listed.";

/// Knowledge used when no knowledge file is configured.
pub const DEFAULT_KNOWLEDGE: &str = "\
Astric builds and supports business software:
- Point-of-sale and inventory systems for shops, restaurants and pharmacies.
- Accounting and invoicing systems with multi-branch reporting.
- School, clinic and HR management systems.
- Company websites, online stores and mobile apps.
- Network installation, surveillance cameras and technical support contracts.
Every system includes installation, staff training and a support period. \
Pricing depends on the number of branches, users and custom features; the team \
prepares a quotation after a short call.";

const KNOWLEDGE_HEADING: &str = "## Company knowledge";
const ADMIN_HEADING: &str = "## Current instructions from the administrator";

/// Join persona, knowledge and admin instructions into one system instruction.
///
/// Blank admin instructions are left out entirely.
pub fn build_system_instruction(knowledge: &str, admin_instructions: &str) -> String {
    let mut instruction = String::with_capacity(
        ASSISTANT_PERSONA.len() + knowledge.len() + admin_instructions.len() + 96,
    );
    instruction.push_str(ASSISTANT_PERSONA);
    instruction.push_str("\n\n");
    instruction.push_str(KNOWLEDGE_HEADING);
    instruction.push('\n');
    instruction.push_str(knowledge.trim());

    let admin = admin_instructions.trim();
    if !admin.is_empty() {
        instruction.push_str("\n\n");
        instruction.push_str(ADMIN_HEADING);
        instruction.push('\n');
        instruction.push_str(admin);
    }

    instruction
}

/// Read knowledge from `path`, or fall back to [`DEFAULT_KNOWLEDGE`].
pub fn load_knowledge(path: Option<&Path>) -> std::io::Result<String> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            tracing::info!(path = %path.display(), bytes = text.len(), "Loaded knowledge file");
            Ok(text)
        }
        None => Ok(DEFAULT_KNOWLEDGE.to_string()),
    }
}
