//! Column selection: explicit flags, or an interactive menu on a terminal.

use dialoguer::Select;
use modelmirror_core::Dataset;
use std::io::IsTerminal;

/// Resolve a column selector. A given name must exist in `dataset`; a
/// missing one is chosen interactively when stdin is a terminal.
pub fn column(
    given: Option<String>,
    dataset: &Dataset,
    flag: &str,
    prompt: &str,
) -> anyhow::Result<String> {
    if let Some(name) = given {
        dataset.column(&name)?;
        return Ok(name);
    }
    if !std::io::stdin().is_terminal() {
        anyhow::bail!("{flag} is required when not running interactively");
    }
    let names = dataset.column_names();
    let selection = Select::new()
        .with_prompt(prompt)
        .items(&names)
        .default(0)
        .interact()?;
    Ok(names[selection].to_string())
}

/// Like [`column`], but the result must differ from every name in `taken`.
pub fn distinct_column(
    given: Option<String>,
    dataset: &Dataset,
    taken: &[&str],
    flag: &str,
    prompt: &str,
) -> anyhow::Result<String> {
    let name = column(given, dataset, flag, prompt)?;
    if taken.contains(&name.as_str()) {
        anyhow::bail!("{flag} '{name}' is already used for another role");
    }
    Ok(name)
}
