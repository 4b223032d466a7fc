//! Tab-completion over a console scope.

use std::collections::BTreeSet;

use mlua::{Table, Value};

use super::scope::ConsoleScope;

/// `__index` chains deeper than this are not followed.
const MAX_CHAIN: usize = 16;

/// Completion candidates for `source`, sorted and de-duplicated.
///
/// `expr.partial` evaluates `expr` and lists its members; anything else
/// completes the trailing identifier against the scope and the builtins.
pub(crate) fn collect(scope: &ConsoleScope, source: &str) -> mlua::Result<Vec<String>> {
    let source = source.trim_end();
    if source.is_empty() {
        return Ok(Vec::new());
    }

    if let Some((expr, prefix)) = source.rsplit_once('.') {
        let expr = expr.trim();
        if !expr.is_empty() {
            let target: Value = scope
                .lua()
                .load(format!("return {expr}"))
                .set_name("=complete")
                .set_environment(scope.env())
                .eval()?;
            let members = member_names(scope, &target)?;
            return Ok(members
                .into_iter()
                .filter(|name| {
                    if prefix.is_empty() {
                        !name.starts_with("__")
                    } else {
                        name.starts_with(prefix)
                    }
                })
                .collect());
        }
    }

    let Some(prefix) = trailing_identifier(source) else {
        return Ok(Vec::new());
    };
    let mut names = BTreeSet::new();
    collect_chain(&scope.env(), &mut names)?;
    collect_chain(scope.globals(), &mut names)?;
    collect_keys(&scope.lua().globals(), &mut names)?;
    Ok(names.into_iter().filter(|n| n.starts_with(prefix)).collect())
}

/// Longest suffix matching `[A-Za-z_][A-Za-z0-9_]*`.
fn trailing_identifier(source: &str) -> Option<&str> {
    let start = source
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_alphanumeric() || *c == '_')
        .last()
        .map(|(i, _)| i)?;
    let ident = source[start..].trim_start_matches(|c: char| c.is_ascii_digit());
    (!ident.is_empty()).then_some(ident)
}

fn member_names(scope: &ConsoleScope, target: &Value) -> mlua::Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    match target {
        Value::Table(table) => collect_chain(table, &mut names)?,
        Value::Nil => {}
        other => {
            // strings and userdata expose members through their metatable
            let getmetatable: mlua::Function = scope.lua().globals().raw_get("getmetatable")?;
            if let Value::Table(meta) = getmetatable.call::<Value>(other.clone())? {
                if let Value::Table(index) = meta.raw_get::<Value>("__index")? {
                    collect_chain(&index, &mut names)?;
                }
            }
        }
    }
    Ok(names)
}

/// Keys of `table` and of every table reachable through `__index`.
fn collect_chain(table: &Table, names: &mut BTreeSet<String>) -> mlua::Result<()> {
    let mut current = table.clone();
    for _ in 0..MAX_CHAIN {
        collect_keys(&current, names)?;
        let Some(meta) = current.metatable() else {
            break;
        };
        match meta.raw_get::<Value>("__index")? {
            Value::Table(next) => current = next,
            _ => break,
        }
    }
    Ok(())
}

fn collect_keys(table: &Table, names: &mut BTreeSet<String>) -> mlua::Result<()> {
    for pair in table.clone().pairs::<Value, Value>() {
        let (key, _) = pair?;
        if let Value::String(key) = key {
            names.insert(key.to_str()?.to_string());
        }
    }
    Ok(())
}
