//! Release message templates (spec.md §6.5).

/// The standard synthetic-release message every adapter without a
/// bespoke template builds from: `Synthetic release for <registry> source
/// package <name> version <version>\n`.
#[must_use]
pub fn standard_message(registry: &str, name: &str, version: &str) -> Vec<u8> {
    format!("Synthetic release for {registry} source package {name} version {version}\n")
        .into_bytes()
}

/// Same as `standard_message`, with a short description paragraph
/// appended (spec.md §6.5: "Adapters may append a short description
/// paragraph").
#[must_use]
pub fn standard_message_with_description(
    registry: &str,
    name: &str,
    version: &str,
    description: &str,
) -> Vec<u8> {
    let mut msg = standard_message(registry, name, version);
    msg.push(b'\n');
    msg.extend_from_slice(description.trim_end().as_bytes());
    msg.push(b'\n');
    msg
}
