use crate::cmd::{read_definitions, CheckArgs};
use crate::exit::{language_error, CliResult, SUCCESS};
use crate::output::{print_definitions, OutputFormat};

/// Parse the definitions and display them. Side-effect free: no pipes
/// are created, no resources are resolved.
pub fn run(args: CheckArgs, format: OutputFormat) -> CliResult<i32> {
    let text = read_definitions(args.definitions.as_deref(), args.file.as_deref())?;
    let definitions =
        sigmux_language::parse(&text).map_err(|err| language_error("parse failed", err))?;
    print_definitions(&definitions, format);
    Ok(SUCCESS)
}
