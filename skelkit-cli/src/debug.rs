use std::{fs::File, io::Write};

use crate::DocumentArgs;

/// Run the debug command: extract a document and output its events as JSON.
pub fn run_debug_command(document: &DocumentArgs, output: Option<String>) -> Result<(), String> {
    let events = document.extract()?;
    let json = serde_json::to_string_pretty(&events)
        .map_err(|e| format!("Error serializing to JSON: {}", e))?;

    match output {
        Some(output_path) => {
            File::create(&output_path)
                .and_then(|mut f| f.write_all(json.as_bytes()))
                .map_err(|e| format!("Error writing to {}: {}", output_path, e))?;
            eprintln!("✅ Debug output written to: {}", output_path);
        }
        None => println!("{}", json),
    }
    Ok(())
}
