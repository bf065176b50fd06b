use std::io::Write;

use skeet_collector::read_artifact;

use crate::config::CatArgs;
use crate::error::AppError;

pub fn run(args: CatArgs) -> Result<(), AppError> {
    let records = read_artifact(&args.path)?;

    let mut out = std::io::BufWriter::new(std::io::stdout().lock());
    for record in &records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n").map_err(AppError::Output)?;
    }
    out.flush().map_err(AppError::Output)?;

    tracing::debug!(path = %args.path.display(), records = records.len(), "printed artifact");
    Ok(())
}
