use crate::action::definitions;
use crate::shape::{Color, Fill, GeoKind};

const BASE_INSTRUCTIONS: &str = "You are an AI agent that helps the user draw on an infinite canvas. \
You act by emitting actions. Coordinates are relative to your chat origin: x grows to the right, y grows downwards. \
Refer to shapes by their shapeId. Never invent ids of shapes you did not create.";

const RESPONSE_FORMAT: &str = "Respond with a single JSON object of the form {\"actions\": [ ... ]} and nothing else. \
Each action is an object with a \"_type\" field and an optional \"intent\" describing why you take it.";

/// System instruction: base block, response format and the action catalogue
/// with one example per kind.
#[must_use]
pub fn system_instruction(base: Option<&str>) -> String {
    let base = base.map(str::trim).filter(|text| !text.is_empty()).unwrap_or(BASE_INSTRUCTIONS);

    let mut out = String::new();
    out.push_str(base);
    out.push_str("\n\n");
    out.push_str(RESPONSE_FORMAT);
    out.push_str("\n\n## Actions\n");
    for definition in definitions() {
        out.push_str(&format!(
            "\n### {}\n{}\nExample: {}\n",
            definition.kind.as_str(),
            definition.summary,
            definition.example
        ));
    }

    out.push_str("\n## Styles\n");
    out.push_str(&format!(
        "Colors: {}\nFills: {}\nShape types: {}, text, note, arrow, line\n",
        Color::ALL.iter().map(Color::as_str).collect::<Vec<_>>().join(", "),
        Fill::ALL.iter().map(Fill::as_str).collect::<Vec<_>>().join(", "),
        GeoKind::ALL.iter().map(GeoKind::as_str).collect::<Vec<_>>().join(", "),
    ));
    out
}
