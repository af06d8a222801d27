//! Race Macros - terse construction of coroutine race programs
//!
//! Writing program trees by hand through `Statement` constructors gets noisy
//! fast. The `program!` macro accepts a small statement language and expands
//! to the equivalent constructor calls, wrapped in the root coroutine scope.
//!
//! ## Syntax Supported:
//!
//! - `delay(ms);` / `print("A");`
//! - `launch { ... }` / `scope_launch { ... }`
//! - `coroutine_scope { ... }` / `supervisor_scope { ... }`
//! - `let job1 = launch { ... };`
//! - `let value1 = async("R") { ... };`
//! - `let job2 = job();`
//! - `join(job1);` / `cancel(job1);` / `complete(job2);`
//! - `print_await(value1, "R");`
//! - `throw(Generic);` / `try_catch(Custom) { ... }`

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse::{Parse, ParseStream},
    parse_macro_input, Error, Expr, Ident, Result, Token,
};

/// Build a root `CoroutineScope` statement.
///
/// Usage:
/// ```ignore
/// let tree = program! {
///     let job1 = launch {
///         delay(1000);
///         print("A");
///     };
///     print("B");
///     join(job1);
/// };
/// ```
#[proc_macro]
pub fn program(input: TokenStream) -> TokenStream {
    let program = parse_macro_input!(input as Program);
    program.expand().into()
}

// ============================================================================
// PARSING STRUCTURES
// ============================================================================

struct Program {
    stmts: Vec<ProgramStmt>,
}

enum ProgramStmt {
    Delay(Expr),
    Print(Expr),
    Throw(Ident),
    Launch(Vec<ProgramStmt>),
    ScopeLaunch(Vec<ProgramStmt>),
    CoroutineScope(Vec<ProgramStmt>),
    SupervisorScope(Vec<ProgramStmt>),
    TryCatch(Ident, Vec<ProgramStmt>),
    LaunchJob(Ident, Vec<ProgramStmt>),
    Async(Ident, Expr, Vec<ProgramStmt>),
    Job(Ident),
    Join(Ident),
    Cancel(Ident),
    Complete(Ident),
    PrintAwait(Ident, Expr),
}

impl Parse for Program {
    fn parse(input: ParseStream) -> Result<Self> {
        Ok(Program {
            stmts: parse_stmts(input)?,
        })
    }
}

fn parse_stmts(input: ParseStream) -> Result<Vec<ProgramStmt>> {
    let mut stmts = Vec::new();
    while !input.is_empty() {
        stmts.push(input.parse()?);
    }
    Ok(stmts)
}

fn parse_body(input: ParseStream) -> Result<Vec<ProgramStmt>> {
    let content;
    syn::braced!(content in input);
    parse_stmts(&content)
}

fn skip_semi(input: ParseStream) -> Result<()> {
    if input.peek(Token![;]) {
        let _: Token![;] = input.parse()?;
    }
    Ok(())
}

fn parse_declaration(input: ParseStream) -> Result<ProgramStmt> {
    let _: Token![let] = input.parse()?;
    let name: Ident = input.parse()?;
    let _: Token![=] = input.parse()?;

    // `async` is a keyword, so it cannot come through as an Ident
    if input.peek(Token![async]) {
        let _: Token![async] = input.parse()?;
        let content;
        syn::parenthesized!(content in input);
        let result: Expr = content.parse()?;
        let body = parse_body(input)?;
        skip_semi(input)?;
        return Ok(ProgramStmt::Async(name, result, body));
    }

    let ident: Ident = input.parse()?;
    let stmt = if ident == "launch" {
        ProgramStmt::LaunchJob(name, parse_body(input)?)
    } else if ident == "job" {
        let content;
        syn::parenthesized!(content in input);
        if !content.is_empty() {
            return Err(content.error("job() takes no arguments"));
        }
        ProgramStmt::Job(name)
    } else {
        return Err(Error::new(
            ident.span(),
            "expected `launch { .. }`, `async(..) { .. }` or `job()`",
        ));
    };
    skip_semi(input)?;
    Ok(stmt)
}

impl Parse for ProgramStmt {
    fn parse(input: ParseStream) -> Result<Self> {
        if input.peek(Token![let]) {
            return parse_declaration(input);
        }

        let ident: Ident = input.parse()?;
        let name = ident.to_string();

        // Block statements
        let block = match name.as_str() {
            "launch" => Some(ProgramStmt::Launch(parse_body(input)?)),
            "scope_launch" => Some(ProgramStmt::ScopeLaunch(parse_body(input)?)),
            "coroutine_scope" => Some(ProgramStmt::CoroutineScope(parse_body(input)?)),
            "supervisor_scope" => Some(ProgramStmt::SupervisorScope(parse_body(input)?)),
            "try_catch" => {
                let content;
                syn::parenthesized!(content in input);
                let kind: Ident = content.parse()?;
                Some(ProgramStmt::TryCatch(kind, parse_body(input)?))
            }
            _ => None,
        };
        if let Some(stmt) = block {
            skip_semi(input)?;
            return Ok(stmt);
        }

        // Leaf statements: `name(args);`
        let content;
        syn::parenthesized!(content in input);
        let stmt = match name.as_str() {
            "delay" => ProgramStmt::Delay(content.parse()?),
            "print" => ProgramStmt::Print(content.parse()?),
            "throw" => ProgramStmt::Throw(content.parse()?),
            "join" => ProgramStmt::Join(content.parse()?),
            "cancel" => ProgramStmt::Cancel(content.parse()?),
            "complete" => ProgramStmt::Complete(content.parse()?),
            "print_await" => {
                let var: Ident = content.parse()?;
                let _: Token![,] = content.parse()?;
                ProgramStmt::PrintAwait(var, content.parse()?)
            }
            _ => {
                return Err(Error::new(
                    ident.span(),
                    format!("unknown statement `{}`", name),
                ))
            }
        };
        let _: Token![;] = input.parse()?;
        Ok(stmt)
    }
}

// ============================================================================
// EXPANSION
// ============================================================================

impl Program {
    fn expand(&self) -> TokenStream2 {
        let body = expand_body(&self.stmts);
        quote! {
            ::coroutine_races::Statement::coroutine_scope(#body)
        }
    }
}

fn expand_body(stmts: &[ProgramStmt]) -> TokenStream2 {
    let stmts: Vec<_> = stmts.iter().map(|s| s.expand()).collect();
    quote! { ::std::vec![#(#stmts),*] }
}

impl ProgramStmt {
    fn expand(&self) -> TokenStream2 {
        match self {
            ProgramStmt::Delay(time) => {
                quote! { ::coroutine_races::Statement::delay(#time) }
            }
            ProgramStmt::Print(text) => {
                quote! { ::coroutine_races::Statement::print(#text) }
            }
            ProgramStmt::Throw(kind) => {
                quote! {
                    ::coroutine_races::Statement::throw(::coroutine_races::ExceptionKind::#kind)
                }
            }
            ProgramStmt::Launch(body) => {
                let body = expand_body(body);
                quote! { ::coroutine_races::Statement::launch(#body) }
            }
            ProgramStmt::ScopeLaunch(body) => {
                let body = expand_body(body);
                quote! { ::coroutine_races::Statement::scope_launch(#body) }
            }
            ProgramStmt::CoroutineScope(body) => {
                let body = expand_body(body);
                quote! { ::coroutine_races::Statement::coroutine_scope(#body) }
            }
            ProgramStmt::SupervisorScope(body) => {
                let body = expand_body(body);
                quote! { ::coroutine_races::Statement::supervisor_scope(#body) }
            }
            ProgramStmt::TryCatch(kind, body) => {
                let body = expand_body(body);
                quote! {
                    ::coroutine_races::Statement::try_catch(
                        ::coroutine_races::ExceptionKind::#kind,
                        #body,
                    )
                }
            }
            ProgramStmt::LaunchJob(var, body) => {
                let var = var.to_string();
                let body = expand_body(body);
                quote! { ::coroutine_races::Statement::launch_job(#var, #body) }
            }
            ProgramStmt::Async(var, result, body) => {
                let var = var.to_string();
                let body = expand_body(body);
                quote! { ::coroutine_races::Statement::async_value(#var, #result, #body) }
            }
            ProgramStmt::Job(var) => {
                let var = var.to_string();
                quote! { ::coroutine_races::Statement::job(#var) }
            }
            ProgramStmt::Join(var) => {
                let var = var.to_string();
                quote! { ::coroutine_races::Statement::join(#var) }
            }
            ProgramStmt::Cancel(var) => {
                let var = var.to_string();
                quote! { ::coroutine_races::Statement::cancel(#var) }
            }
            ProgramStmt::Complete(var) => {
                let var = var.to_string();
                quote! { ::coroutine_races::Statement::complete_job(#var) }
            }
            ProgramStmt::PrintAwait(var, text) => {
                let var = var.to_string();
                quote! { ::coroutine_races::Statement::print_await(#var, #text) }
            }
        }
    }
}
