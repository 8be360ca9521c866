//! # Validate CLI -- offline CUIT/CUIL checks.

use anyhow::Result;
use clap::Args;

use padron_core::Cuit;

/// Arguments for `padron validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Tax ID in any common notation (`20-30405060-9`, `20304050609`, ...).
    pub tax_id: String,

    /// Print the result as a JSON object.
    #[arg(long)]
    pub json: bool,
}

/// Execute `padron validate`. Returns exit code 1 for an invalid ID.
pub fn run_validate(args: &ValidateArgs) -> Result<u8> {
    let cuit = match Cuit::new(&args.tax_id) {
        Ok(cuit) => cuit,
        Err(e) => {
            if args.json {
                println!(
                    "{}",
                    serde_json::json!({ "input": args.tax_id, "valid": false, "error": e.to_string() })
                );
            } else {
                println!("INVALID  {e}");
            }
            return Ok(1);
        }
    };

    if args.json {
        println!(
            "{}",
            serde_json::json!({
                "input": args.tax_id,
                "valid": true,
                "normalized": cuit.as_str(),
                "formatted": cuit.formatted(),
                "doc_type": cuit.doc_type().as_str(),
            })
        );
    } else {
        println!("VALID    {} ({})", cuit.formatted(), cuit.doc_type());
    }
    Ok(0)
}
