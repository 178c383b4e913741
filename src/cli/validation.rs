use crate::cli::args::CliArgs;

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(threads) = args.threads {
        if threads == 0 {
            return Err("invalid threads, expected positive integer".to_string());
        }
    }
    if let Some(ratio) = args.ratio_404 {
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(format!("invalid --ratio {ratio}, expected a value in (0, 1]"));
        }
    }
    if let Some(raw) = args.methods.as_deref() {
        crate::utils::parse_http_methods_csv(raw)
            .map_err(|e| format!("invalid --methods '{raw}': {e}"))?;
    }
    if let Some(raw) = args.bad_responses.as_deref() {
        crate::utils::parse_u16_set_csv(raw)
            .map_err(|e| format!("invalid --bad-responses '{raw}': {e}"))?;
    }
    for raw in args.headers.iter() {
        crate::utils::parse_header_spec(raw)
            .map_err(|e| format!("invalid --header '{raw}': {e}"))?;
    }
    for raw in args.bad_headers.iter() {
        crate::utils::parse_header_spec(raw)
            .map_err(|e| format!("invalid --bad-header '{raw}': {e}"))?;
    }
    if let Some(raw) = args.output_format.as_deref() {
        if crate::output::OutputFormat::parse(raw).is_none() {
            return Err(format!("invalid --output-format '{raw}', expected text or json"));
        }
    }
    if let Some(rate) = args.rate {
        if rate == 0 {
            return Err("invalid rate, expected positive integer".to_string());
        }
    }
    Ok(())
}
