// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use embla_config::Persona;
use embla_tools::{canonical_json, ToolRegistry};

/// Build the synthesized system prompt: identity, persona, the tool
/// catalog, and the tool-call protocol.
///
/// The catalog lists every registered tool with its description and its
/// parameter schema rendered as canonical JSON (keys sorted), so the
/// prompt is stable across runs.
pub fn system_prompt(persona: &Persona, tools: &ToolRegistry) -> String {
    let mut prompt = identity(persona);
    if !tools.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(&tool_catalog(tools));
        prompt.push_str("\n\n");
        prompt.push_str(protocol());
    }
    prompt
}

fn identity(persona: &Persona) -> String {
    format!(
        "You are {}, an AI assistant running entirely on this device. \
         Conversations never leave the device. {}",
        persona.name, persona.style
    )
}

fn tool_catalog(tools: &ToolRegistry) -> String {
    let mut section = String::from("# Tools\n\nYou can use these tools on the user's behalf:\n");
    for schema in tools.schemas() {
        section.push_str(&format!(
            "\n## {}\n{}\nParameters: {}\n",
            schema.name,
            schema.description,
            canonical_json(&schema.parameters)
        ));
    }
    section
}

fn protocol() -> &'static str {
    "# Calling tools\n\n\
     To call a tool, emit exactly one block per call:\n\n\
     <tool_call>{\"name\": \"<tool name>\", \"arguments\": {\"<parameter>\": \"<value>\"}}</tool_call>\n\n\
     The payload must be valid JSON and `arguments` must match the tool's \
     parameter schema. After emitting a call, stop and wait for the result \
     before continuing. When no tool is needed, just answer."
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn includes_persona_name() {
        let prompt = system_prompt(&Persona::default(), &ToolRegistry::new());
        assert!(prompt.contains("You are Embla"));
    }

    #[test]
    fn empty_registry_omits_tool_sections() {
        let prompt = system_prompt(&Persona::default(), &ToolRegistry::new());
        assert!(!prompt.contains("# Tools"));
        assert!(!prompt.contains("<tool_call>"));
    }

    #[test]
    fn lists_every_default_tool_with_schema() {
        let tools = ToolRegistry::with_default_tools();
        let prompt = system_prompt(&Persona::default(), &tools);
        for name in tools.names() {
            assert!(prompt.contains(&format!("## {name}")), "missing catalog entry for {name}");
        }
        assert!(prompt.contains(r#""type":"object""#));
        assert!(prompt.contains("<tool_call>"));
    }

    #[test]
    fn custom_persona_style_is_carried() {
        let persona = Persona { name: "Test".into(), style: "Answer in haiku.".into() };
        let prompt = system_prompt(&persona, &ToolRegistry::new());
        assert!(prompt.contains("Answer in haiku."));
    }
}
