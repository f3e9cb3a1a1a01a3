//! Help listings generated from the live registry.

use crate::registry::Registry;
use crate::types::ValueKind;
use std::io::{self, Write};

/// `--help-attributes`: every attribute with type, cost, and cache
/// status.
pub fn print_attributes(out: &mut impl Write, registry: &Registry) -> io::Result<()> {
    writeln!(out, "{:<18} {:<10} {:>4}  {:<6}  DESCRIPTION", "ATTRIBUTE", "TYPE", "COST", "CACHED")?;
    for (name, def) in registry.iter_attributes() {
        writeln!(
            out,
            "{:<18} {:<10} {:>4}  {:<6}  {}",
            name,
            def.kind.name(),
            def.cost,
            if def.cacheable { "yes" } else { "no" },
            def.help,
        )?;
    }
    Ok(())
}

/// `--help-types`: the closed type list with operator tables and count
/// policies.
pub fn print_types(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "{:<10} {:<22} COUNT", "TYPE", "OPERATORS")?;
    for kind in ValueKind::ALL {
        let operators: Vec<&str> = kind.operators().iter().map(|op| op.symbol()).collect();
        let count = match kind.count_policy() {
            Some(crate::types::CountPolicy::Sum) => "sum",
            Some(crate::types::CountPolicy::Tally) => "tally",
            None => "-",
        };
        writeln!(out, "{:<10} {:<22} {}", kind.name(), operators.join(" "), count)?;
    }
    Ok(())
}

/// `--help-plugins`: the registered providers.
pub fn print_plugins(out: &mut impl Write, registry: &Registry) -> io::Result<()> {
    writeln!(out, "{:<10} {:>10}  DESCRIPTION", "PLUGIN", "ATTRIBUTES")?;
    for provider in registry.providers() {
        writeln!(
            out,
            "{:<10} {:>10}  {}",
            provider.name(),
            provider.attributes().len(),
            provider.help(),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_listing() {
        let registry = Registry::with_builtins().unwrap();
        let mut buf = Vec::new();
        print_attributes(&mut buf, &registry).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("file.size"));
        assert!(text.contains("text.lines"));
        assert!(text.contains("ignore.ignored"));
    }

    #[test]
    fn test_type_listing() {
        let mut buf = Vec::new();
        print_types(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("size"));
        assert!(text.contains("boolean"));
        assert!(text.contains("tally"));
    }

    #[test]
    fn test_plugin_listing() {
        let registry = Registry::with_builtins().unwrap();
        let mut buf = Vec::new();
        print_plugins(&mut buf, &registry).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("file"));
        assert!(text.contains("text"));
    }
}
