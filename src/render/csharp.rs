//! C#-flavoured signature text.

use crate::metadata::{Primitive, RawMethod, RawParameter, TypeName};

/// Turns metadata types and methods into display text.
///
/// The overload key must be stable for a given method shape: the diff
/// engine uses it as part of member identity. Renaming a generic parameter
/// does not change the shape.
pub trait SignatureRenderer: Send + Sync {
    /// Display name of a type.
    fn type_name(&self, ty: &TypeName) -> String;

    /// Name plus parameter types, e.g. `Add(int, int)`. Generic methods
    /// carry their arity and reference generic parameters by position.
    fn overload_key(&self, method: &RawMethod) -> String;

    /// Full declaration including modifiers and parameter names.
    fn declaration(&self, method: &RawMethod) -> String;

    /// Parameter type as written in a parameter list (with `ref`/`out`/`in`).
    fn parameter_type(&self, param: &RawParameter) -> String {
        match &param.ty {
            TypeName::ByRef(inner) => {
                let keyword = if param.is_out {
                    "out"
                } else if param.is_in {
                    "in"
                } else {
                    "ref"
                };
                format!("{} {}", keyword, self.type_name(inner))
            }
            other => self.type_name(other),
        }
    }
}

/// The default renderer: C# keywords and generic syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct CSharpRenderer;

impl CSharpRenderer {
    /// With `positional`, generic parameters render by index instead of name:
    /// a backtick prefix for type parameters, two for method parameters.
    fn render(&self, ty: &TypeName, positional: bool) -> String {
        match ty {
            TypeName::Primitive(p) => keyword(*p).to_string(),
            TypeName::Named { full_name, args } => {
                if full_name == "System.Nullable`1" && args.len() == 1 {
                    return format!("{}?", self.render(&args[0], positional));
                }
                split_generic_segments(full_name, args)
                    .into_iter()
                    .map(|(segment, args)| {
                        if args.is_empty() {
                            segment.to_string()
                        } else {
                            let args: Vec<String> =
                                args.iter().map(|a| self.render(a, positional)).collect();
                            format!("{}<{}>", segment, args.join(", "))
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(".")
            }
            TypeName::GenericParam { index, method, .. } if positional => {
                format!("{}{}", if *method { "``" } else { "`" }, index)
            }
            TypeName::GenericParam { name, .. } => name.clone(),
            TypeName::SzArray(inner) => format!("{}[]", self.render(inner, positional)),
            TypeName::Array { element, rank } => format!(
                "{}[{}]",
                self.render(element, positional),
                ",".repeat(rank.saturating_sub(1) as usize)
            ),
            TypeName::Pointer(inner) => format!("{}*", self.render(inner, positional)),
            TypeName::ByRef(inner) => format!("ref {}", self.render(inner, positional)),
            TypeName::FnPtr => "delegate*".to_string(),
        }
    }

    fn key_parameter_type(&self, param: &RawParameter) -> String {
        match &param.ty {
            TypeName::ByRef(inner) => {
                let keyword = if param.is_out {
                    "out"
                } else if param.is_in {
                    "in"
                } else {
                    "ref"
                };
                format!("{} {}", keyword, self.render(inner, true))
            }
            other => self.render(other, true),
        }
    }

    fn generic_suffix(method: &RawMethod) -> String {
        if method.generic_params.is_empty() {
            String::new()
        } else {
            format!("<{}>", method.generic_params.join(", "))
        }
    }

    fn modifiers(method: &RawMethod) -> &'static str {
        let m = &method.modifiers;
        if m.is_static {
            "static "
        } else if m.is_abstract && !m.is_override {
            "abstract "
        } else if m.is_sealed {
            "sealed override "
        } else if m.is_override {
            "override "
        } else if m.is_virtual {
            "virtual "
        } else {
            ""
        }
    }
}

impl SignatureRenderer for CSharpRenderer {
    fn type_name(&self, ty: &TypeName) -> String {
        self.render(ty, false)
    }

    fn overload_key(&self, method: &RawMethod) -> String {
        let params: Vec<String> = method
            .parameters
            .iter()
            .map(|p| self.key_parameter_type(p))
            .collect();
        let arity = match method.generic_params.len() {
            0 => String::new(),
            n => format!("``{}", n),
        };
        format!("{}{}({})", method.name, arity, params.join(", "))
    }

    fn declaration(&self, method: &RawMethod) -> String {
        let params: Vec<String> = method
            .parameters
            .iter()
            .map(|p| format!("{} {}", self.parameter_type(p), p.name))
            .collect();
        format!(
            "public {}{} {}{}({})",
            CSharpRenderer::modifiers(method),
            self.type_name(&method.return_type),
            method.name,
            CSharpRenderer::generic_suffix(method),
            params.join(", ")
        )
    }
}

fn keyword(p: Primitive) -> &'static str {
    match p {
        Primitive::Void => "void",
        Primitive::Boolean => "bool",
        Primitive::Char => "char",
        Primitive::SByte => "sbyte",
        Primitive::Byte => "byte",
        Primitive::Int16 => "short",
        Primitive::UInt16 => "ushort",
        Primitive::Int32 => "int",
        Primitive::UInt32 => "uint",
        Primitive::Int64 => "long",
        Primitive::UInt64 => "ulong",
        Primitive::Single => "float",
        Primitive::Double => "double",
        Primitive::String => "string",
        Primitive::Object => "object",
        Primitive::IntPtr => "nint",
        Primitive::UIntPtr => "nuint",
        Primitive::TypedReference => "System.TypedReference",
    }
}

/// Split ``Ns.Outer`1+Inner`1`` into its nesting segments, stripping arity
/// markers and handing each segment its share of the generic arguments.
///
/// The first segment keeps its namespace. Arguments left over when the
/// arity markers run out go to the last segment.
pub(crate) fn split_generic_segments<'a, 'n>(
    full_name: &'n str,
    args: &'a [TypeName],
) -> Vec<(&'n str, &'a [TypeName])> {
    let segments: Vec<&str> = full_name.split('+').collect();
    let last = segments.len() - 1;
    let mut remaining = args;
    let mut out = Vec::with_capacity(segments.len());

    for (i, segment) in segments.into_iter().enumerate() {
        let (name, arity) = match segment.rsplit_once('`') {
            Some((name, arity)) => match arity.parse::<usize>() {
                Ok(arity) => (name, arity),
                Err(_) => (segment, 0),
            },
            None => (segment, 0),
        };
        let take = if i == last {
            remaining.len()
        } else {
            arity.min(remaining.len())
        };
        let (mine, rest) = remaining.split_at(take);
        remaining = rest;
        out.push((name, mine));
    }

    out
}
