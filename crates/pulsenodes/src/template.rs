use pulsecore::VarMap;
use serde_json::Value;

/// Render `{{variable}}` placeholders against context variables.
///
/// Unknown placeholders are left in place so a half-rendered template is
/// visible in the output instead of silently vanishing.
pub fn render_template(template: &str, variables: &VarMap) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        rendered.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        match after_open.find("}}") {
            Some(close) => {
                let key = after_open[..close].trim();
                match variables.get(key) {
                    Some(value) => rendered.push_str(&value_to_text(value)),
                    None => {
                        rendered.push_str("{{");
                        rendered.push_str(&after_open[..close]);
                        rendered.push_str("}}");
                    }
                }
                rest = &after_open[close + 2..];
            }
            None => {
                rendered.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    rendered.push_str(rest);
    rendered
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
