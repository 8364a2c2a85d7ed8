//! `tiered template`: render a template against ad-hoc inputs.

use serde_json::Value;
use tiered_core::models::io_mapping::SubroutineIoMapping;

/// Render `template` with `inputs` given as a JSON object of name → value.
pub fn render(template: &str, inputs: &str, languages: &[String]) -> Result<String, String> {
    let parsed: Value =
        serde_json::from_str(inputs).map_err(|e| format!("Invalid --inputs JSON: {}", e))?;
    let Value::Object(map) = parsed else {
        return Err("--inputs must be a JSON object".to_string());
    };

    let mapping = map
        .into_iter()
        .fold(SubroutineIoMapping::new(), |m, (name, value)| m.with_input(name, value));

    tiered_core::template::render(template, &mapping, languages).map_err(|e| e.to_string())
}

pub fn run(template: &str, inputs: &str, languages: &[String]) -> Result<(), String> {
    println!("{}", render(template, inputs, languages)?);
    Ok(())
}
