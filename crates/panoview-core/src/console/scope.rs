//! Name resolution for console commands.

use std::fmt;

use mlua::{IntoLua, Lua, Table};

/// Globals and optional locals the console evaluates against.
///
/// A scope is held by reference: bindings made by one command (or by host
/// code through [`ConsoleScope::set`]) are visible to later commands.
#[derive(Clone)]
pub struct ConsoleScope {
    lua: Lua,
    globals: Table,
    locals: Option<Table>,
}

impl ConsoleScope {
    /// The interpreter's own top-level namespace.
    pub fn ambient(lua: &Lua) -> Self {
        Self {
            lua: lua.clone(),
            globals: lua.globals(),
            locals: None,
        }
    }

    /// A fresh namespace that still resolves the interpreter's builtins.
    pub fn isolated(lua: &Lua) -> mlua::Result<Self> {
        let globals = lua.create_table()?;
        chain_to(lua, &globals, &lua.globals())?;
        Ok(Self {
            lua: lua.clone(),
            globals,
            locals: None,
        })
    }

    /// Evaluate into a separate locals table that falls back to globals.
    pub fn with_locals(mut self, locals: Table) -> mlua::Result<Self> {
        if locals.metatable().is_none() {
            chain_to(&self.lua, &locals, &self.globals)?;
        }
        self.locals = Some(locals);
        Ok(self)
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn globals(&self) -> &Table {
        &self.globals
    }

    pub fn locals(&self) -> Option<&Table> {
        self.locals.as_ref()
    }

    /// Table commands run in: locals when present, else globals.
    pub(crate) fn env(&self) -> Table {
        self.locals.clone().unwrap_or_else(|| self.globals.clone())
    }

    /// Bind `name` in the scope's environment.
    pub fn set(&self, name: &str, value: impl IntoLua) -> mlua::Result<()> {
        self.env().set(name, value)
    }

    pub fn get<V: mlua::FromLua>(&self, name: &str) -> mlua::Result<V> {
        self.env().get(name)
    }
}

impl fmt::Debug for ConsoleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleScope")
            .field("has_locals", &self.locals.is_some())
            .finish_non_exhaustive()
    }
}

/// Make lookups missing from `table` fall through to `parent`.
fn chain_to(lua: &Lua, table: &Table, parent: &Table) -> mlua::Result<()> {
    let meta = lua.create_table()?;
    meta.set("__index", parent.clone())?;
    table.set_metatable(Some(meta));
    Ok(())
}
