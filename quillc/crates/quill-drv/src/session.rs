//! The session: pipeline orchestration and binding lifecycle.
//!
//! One `Session` lives for the whole REPL run. It owns the type
//! registry, the persistent environment, the overload family and
//! instance tables, the source map and the compiled-statement cache.
//! All of it is shared immutable from the evaluator's point of view:
//! each statement extends, never mutates, and an aborted statement
//! leaves everything exactly as it was.

use crate::cache::{CacheKey, CachedStatement, StatementCache};
use crate::config::Config;
use quill_core::{CoreStatement, LowerError, Lowerer};
use quill_eval::rel::{NoopAdapter, RelAdapter};
use quill_eval::{builtins, Binding, Env, Evaluator, InstanceTable, Raise, Value};
use quill_par::ast::Statement;
use quill_par::{unparse, ParseError, Parser};
use quill_sem::{EnvEntry, OverloadTable, TypeError, TypeResolver};
use quill_typ::{Scheme, TypeRegistry};
use quill_util::{Diagnostic, FileId, Handler, Pos, SourceMap, Symbol};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use thiserror::Error;

/// A statement-scoped failure; the environment is unchanged
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Type(#[from] TypeError),
    #[error("{0}")]
    Lower(#[from] LowerError),
    #[error("{0}")]
    Runtime(Raise),
    #[error("{0}")]
    Datalog(#[from] quill_dl::DatalogError),
}

impl SessionError {
    /// Position for the `stdIn:L.C-L.C Error:` prefix
    pub fn pos(&self) -> Pos {
        match self {
            SessionError::Parse(e) => e.pos(),
            SessionError::Type(e) => e.pos(),
            SessionError::Lower(e) => e.pos(),
            SessionError::Runtime(raise) => raise.raised_at(),
            SessionError::Datalog(e) => e.pos(),
        }
    }
}

/// One printed output line: `val NAME = VALUE : TYPE`
#[derive(Debug, Clone, PartialEq)]
pub struct PrintedBinding {
    pub name: String,
    pub value: String,
    pub ty: String,
}

/// Everything one statement produced
#[derive(Debug, Clone)]
pub struct StatementOutcome {
    pub printed: Vec<PrintedBinding>,
    pub warnings: Vec<Diagnostic>,
    /// The canonical unparse, for `--echo`
    pub canonical: String,
}

/// A compiled statement: typed, lowered, ready to evaluate
pub struct CompiledStatement {
    pub core: CoreStatement,
    pub bindings: Vec<(Symbol, Scheme)>,
    pub warnings: Vec<Diagnostic>,
    pub canonical: String,
    /// Cacheable iff it registers nothing in session-level tables
    cacheable: bool,
}

/// The interactive session
pub struct Session {
    pub config: Config,
    registry: TypeRegistry,
    overloads: OverloadTable,
    globals: FxHashMap<Symbol, EnvEntry>,
    env: Env,
    instances: InstanceTable,
    adapter: Box<dyn RelAdapter>,
    pub source_map: SourceMap,
    cache: Rc<RefCell<StatementCache>>,
    /// Rolling hash of everything that has shaped the environment: the
    /// basis, any foreign provider, and the canonical text of every
    /// executed statement, in order. Equal fingerprints mean the
    /// sessions replayed identical histories, so a cache hit can never
    /// be stale.
    fingerprint: u64,
}

impl Session {
    pub fn new(config: Config) -> Self {
        let cache = Rc::new(RefCell::new(StatementCache::new(config.cache_capacity)));
        Self::with_cache(config, cache)
    }

    /// Share a process-wide cache between sessions
    pub fn with_cache(config: Config, cache: Rc<RefCell<StatementCache>>) -> Self {
        let mut registry = TypeRegistry::new();
        let mut globals = FxHashMap::default();
        let mut env_bindings = Vec::new();
        let mut fingerprint = fingerprint_step(0, "basis");
        for (name, scheme, value) in builtins::basis(&mut registry) {
            fingerprint = fingerprint_step(fingerprint, name.as_str());
            globals.insert(name, EnvEntry::var(scheme.clone()));
            env_bindings.push(Binding {
                name,
                scheme,
                value,
            });
        }
        let env = Env::empty().extend(env_bindings);
        let mut source_map = SourceMap::new();
        source_map.add_file("stdIn", "");

        let mut session = Self {
            config,
            registry,
            overloads: OverloadTable::new(),
            globals,
            env,
            instances: InstanceTable::new(),
            adapter: Box::new(NoopAdapter),
            source_map,
            cache,
            fingerprint,
        };
        if let Some(provider_name) = session.config.foreign.clone() {
            session.load_foreign(&provider_name);
        }
        session
    }

    /// Install a foreign provider's bindings, if the name is known
    fn load_foreign(&mut self, provider_name: &str) {
        let Some(provider) = quill_eval::foreign::find_provider(provider_name) else {
            tracing::warn!("unknown foreign provider: {}", provider_name);
            return;
        };
        self.fingerprint = fingerprint_step(self.fingerprint, provider_name);
        let mut bindings = Vec::new();
        for (name, ty, value) in provider.provide(&mut self.registry) {
            let scheme = Scheme::mono(ty);
            self.globals.insert(name, EnvEntry::var(scheme.clone()));
            self.adapter.register_foreign(name, value.clone());
            bindings.push(Binding {
                name,
                scheme,
                value,
            });
        }
        self.env = self.env.extend(bindings);
    }

    /// Register a source file (for `use`) and return its id
    pub fn add_source(&mut self, name: &str, content: &str) -> FileId {
        self.source_map.add_file(name, content)
    }

    // =========================================================================
    // The pipeline
    // =========================================================================

    /// Compile one statement: resolve types and lower. Returns the
    /// compiled statement plus the warnings the phases emitted.
    pub fn prepare_statement(
        &mut self,
        statement: &Statement,
    ) -> Result<CompiledStatement, SessionError> {
        let _span = tracing::debug_span!("prepare_statement").entered();
        let canonical = unparse::statement(statement);
        let tstmt = {
            let mut resolver =
                TypeResolver::new(&mut self.registry, &self.globals, &mut self.overloads);
            resolver.resolve_statement(statement)?
        };
        let handler = Handler::new();
        let core = {
            let mut lowerer = Lowerer::new(&mut self.registry, &handler);
            lowerer.lower_statement(&tstmt)?
        };
        let cacheable = core.inst.is_none()
            && !tstmt.decl.kind.registers_session_state();
        Ok(CompiledStatement {
            core,
            bindings: tstmt.bindings,
            warnings: handler.drain(),
            canonical,
            cacheable,
        })
    }

    /// Evaluate a compiled statement and publish its bindings
    pub fn eval_statement(
        &mut self,
        compiled: &CompiledStatement,
    ) -> Result<Vec<PrintedBinding>, SessionError> {
        let _span = tracing::debug_span!("eval_statement").entered();
        let mut scratch = self.env.clone();
        {
            let evaluator =
                Evaluator::new(&self.registry, self.adapter.as_ref(), &self.instances);
            for decl in &compiled.core.decls {
                scratch = evaluator
                    .eval_decl(decl, &scratch)
                    .map_err(SessionError::Runtime)?;
            }
        }
        if let Some((name, exp)) = &compiled.core.inst {
            let value = {
                let evaluator =
                    Evaluator::new(&self.registry, self.adapter.as_ref(), &self.instances);
                evaluator
                    .eval(exp, &scratch)
                    .map_err(SessionError::Runtime)?
            };
            self.instances.push(*name, value);
        }
        let mut published = Vec::new();
        let mut printed = Vec::new();
        for (name, scheme) in &compiled.bindings {
            let Some(value) = scratch.lookup_value(*name) else {
                continue;
            };
            printed.push(PrintedBinding {
                name: name.to_string(),
                value: value.to_string(),
                ty: self.registry.display(scheme.body),
            });
            published.push((*name, scheme.clone(), value));
        }
        self.publish(&published);
        Ok(printed)
    }

    /// Extend the environment with finished bindings
    fn publish(&mut self, bindings: &[(Symbol, Scheme, Value)]) {
        if bindings.is_empty() {
            return;
        }
        let mut env_bindings = Vec::new();
        for (name, scheme, value) in bindings {
            self.globals.insert(*name, EnvEntry::var(scheme.clone()));
            env_bindings.push(Binding {
                name: *name,
                scheme: scheme.clone(),
                value: value.clone(),
            });
        }
        // Datatype constructors carry constructor status for pattern
        // resolution in later statements.
        for (name, scheme, _) in bindings {
            if let Some(def) = self.registry.datatype_of_ctor(*name) {
                let data_name = def.name;
                self.globals
                    .insert(*name, EnvEntry::ctor(scheme.clone(), data_name));
            }
        }
        self.env = self.env.extend(env_bindings);
    }

    /// Parse and run every statement in `source`, returning outcomes in
    /// order; stops at the first error
    pub fn execute_all(
        &mut self,
        source: &str,
        file_id: FileId,
    ) -> Result<Vec<StatementOutcome>, SessionError> {
        let tokens = quill_lex::tokenize(source, file_id).map_err(|e| {
            SessionError::Parse(ParseError::UnexpectedToken {
                expected: "a token".to_string(),
                found: e.to_string(),
                pos: e.pos,
            })
        })?;
        let mut parser = Parser::new(tokens);
        let mut outcomes = Vec::new();
        while let Some(statement) = parser.parse_statement()? {
            outcomes.push(self.execute(&statement)?);
        }
        Ok(outcomes)
    }

    /// Run one parsed statement through cache, compile, evaluate
    pub fn execute(&mut self, statement: &Statement) -> Result<StatementOutcome, SessionError> {
        let canonical = unparse::statement(statement);
        let key = CacheKey {
            canonical: canonical.clone(),
            fingerprint: self.fingerprint,
        };
        let hit = self.cache.borrow_mut().lookup(&key);
        if let Some(hit) = hit {
            tracing::debug!(statement = %canonical, "statement cache hit");
            self.publish(&hit.bindings);
            self.fingerprint = fingerprint_step(self.fingerprint, &canonical);
            return Ok(StatementOutcome {
                printed: hit.printed.clone(),
                warnings: Vec::new(),
                canonical,
            });
        }
        let compiled = self.prepare_statement(statement)?;
        let printed = self.eval_statement(&compiled)?;
        self.fingerprint = fingerprint_step(self.fingerprint, &canonical);
        if compiled.cacheable {
            let bindings = compiled
                .bindings
                .iter()
                .filter_map(|(name, scheme)| {
                    self.env
                        .lookup_value(*name)
                        .map(|value| (*name, scheme.clone(), value))
                })
                .collect();
            self.cache.borrow_mut().insert(
                key,
                CachedStatement {
                    printed: printed.clone(),
                    bindings,
                },
            );
        }
        Ok(StatementOutcome {
            printed,
            warnings: compiled.warnings,
            canonical,
        })
    }

    /// Run a Datalog program; the result prints as `it`
    pub fn execute_datalog(
        &mut self,
        source: &str,
        file_id: FileId,
    ) -> Result<StatementOutcome, SessionError> {
        let directory = self.config.directory.clone();
        let exp = quill_dl::compile_program(source, file_id, &directory)?;
        let statement = Statement::Expr(exp);
        let compiled = self.prepare_statement(&statement)?;
        let printed = self.eval_statement(&compiled)?;
        self.fingerprint = fingerprint_step(self.fingerprint, source);
        Ok(StatementOutcome {
            printed,
            warnings: compiled.warnings,
            canonical: String::new(),
        })
    }

}

/// Extend a rolling fingerprint with one more step of history
fn fingerprint_step(previous: u64, text: &str) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    previous.hash(&mut hasher);
    text.hash(&mut hasher);
    hasher.finish()
}
