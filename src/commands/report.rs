use crate::args::ExportArgs;
use crate::commands::{authorize, Out};
use crate::error::{ErrorType, IntoResult};
use crate::finance::ExportTable;
use crate::model::Permission;
use crate::utils::{self, plural};
use crate::{report, Config, Result};
use std::path::PathBuf;
use tracing::debug;

/// Writes a report of the completed transactions matching the filter to `args.out`. Requires
/// `ExportReports`.
pub async fn export_report(config: Config, actor: &str, args: ExportArgs) -> Result<Out<PathBuf>> {
    authorize(&config, actor, Permission::ExportReports).await?;
    let filter = args.filter.to_filter();
    let records = config
        .db()
        .list_transactions(&filter)
        .await
        .pub_result(ErrorType::Database)?;
    let title = format!("{} Financial Report", config.church_name());
    let table = ExportTable::build(title, &filter, &records, config.currency());
    let bytes = report::render(args.format, &table, &records).pub_result(ErrorType::Report)?;
    debug!("Rendered {} bytes of {}", bytes.len(), args.format);
    utils::write(&args.out, bytes)
        .await
        .pub_result(ErrorType::Report)?;
    Ok(Out::new(
        format!(
            "Wrote a {} report of {} transaction{} to {}",
            args.format.extension(),
            records.len(),
            plural(records.len()),
            args.out.display()
        ),
        args.out,
    ))
}
