//! Generated hython scripts, one per bridge operation.
//!
//! Every caller-supplied string goes through [`py_literal`] before it is
//! placed in the source, so node paths, parameter names and values can carry
//! quotes, backslashes or newlines without changing the script.

use std::fmt::Write as _;
use std::path::Path;

use super::markers::{NODE_LIST, PARAM_LIST, PARM_VALUE};
use crate::config::MissingParameterPolicy;

/// Exit code used when a set targets a parameter that doesn't exist and the
/// policy is [`MissingParameterPolicy::Error`]
pub const MISSING_PARAMETER_EXIT_CODE: i32 = 3;

/// Exit code used when the text can't be converted to the parameter's type
/// without changing its meaning (fractional int, unknown toggle word)
pub const INVALID_VALUE_EXIT_CODE: i32 = 4;

/// Render a string as a single-quoted Python 3 string literal.
///
/// Backslash, quote and control characters are escaped; everything else is
/// emitted as-is (scripts are written as UTF-8).
pub fn py_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\U{:08x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn path_literal(path: &Path) -> String {
    py_literal(&path.to_string_lossy())
}

fn preamble(document: &Path) -> String {
    format!(
        "import hou\n\
         hou.hipFile.load({}, suppress_save_prompt=True, ignore_load_warnings=True)\n",
        path_literal(document)
    )
}

/// Print every node path under `/`, recursively.
pub fn list_nodes(document: &Path) -> String {
    let mut script = preamble(document);
    let _ = write!(
        script,
        "print({start})\n\
         for node in hou.node('/').allSubChildren():\n    \
         print(node.path())\n\
         print({end})\n",
        start = py_literal(NODE_LIST.start),
        end = py_literal(NODE_LIST.end),
    );
    script
}

/// Print every parameter name of one node; an unresolvable node gives an empty list.
pub fn list_parameters(document: &Path, node: &str) -> String {
    let mut script = preamble(document);
    let _ = write!(
        script,
        "node = hou.node({node})\n\
         names = [parm.name() for parm in node.parms()] if node is not None else []\n\
         print({start})\n\
         for name in names:\n    \
         print(name)\n\
         print({end})\n",
        node = py_literal(node),
        start = py_literal(PARAM_LIST.start),
        end = py_literal(PARAM_LIST.end),
    );
    script
}

/// Print the evaluated value of one parameter. A missing node or parameter
/// raises inside the interpreter.
pub fn get_parameter_value(document: &Path, node: &str, parameter: &str) -> String {
    let mut script = preamble(document);
    let _ = write!(
        script,
        "node = hou.node({node})\n\
         value = node.parm({parm}).eval()\n\
         print({start})\n\
         print(value)\n\
         print({end})\n",
        node = py_literal(node),
        parm = py_literal(parameter),
        start = py_literal(PARM_VALUE.start),
        end = py_literal(PARM_VALUE.end),
    );
    script
}

/// Converts the `text` variable to the parameter's type and sets it.
/// Text that would only fit by truncating or guessing goes to `reject`.
const SET_FROM_TEXT: &[&str] = &[
    "kind = parm.parmTemplate().type()",
    "if kind == hou.parmTemplateType.Int:",
    "    try:",
    "        number = int(text.strip())",
    "    except ValueError:",
    "        number = float(text)",
    "        if not number.is_integer():",
    "            reject('Not an integer value: %r' % text)",
    "        number = int(number)",
    "    parm.set(number)",
    "elif kind == hou.parmTemplateType.Float:",
    "    parm.set(float(text))",
    "elif kind == hou.parmTemplateType.Toggle:",
    "    flag = text.strip().lower()",
    "    if flag in ('1', 'true', 'on', 'yes'):",
    "        parm.set(1)",
    "    elif flag in ('0', 'false', 'off', 'no'):",
    "        parm.set(0)",
    "    else:",
    "        reject('Not a toggle value: %r' % text)",
    "else:",
    "    parm.set(text)",
];

/// Set one parameter from its text form and save the document in place.
///
/// The text is converted to the parameter's own type inside the interpreter
/// (int, float, toggle), other parameter types receive the string unchanged.
/// Fractional text for an int or an unknown toggle word exits with
/// [`INVALID_VALUE_EXIT_CODE`] before the document is saved.
pub fn set_parameter_value(
    document: &Path,
    node: &str,
    parameter: &str,
    value: &str,
    missing: MissingParameterPolicy,
) -> String {
    let mut script = preamble(document);
    let _ = write!(
        script,
        "import sys\n\
         node = hou.node({node})\n\
         parm = node.parm({parm})\n\
         text = {value}\n\
         def reject(message):\n    \
         sys.stderr.write(message + '\\n')\n    \
         sys.exit({code})\n",
        node = py_literal(node),
        parm = py_literal(parameter),
        value = py_literal(value),
        code = INVALID_VALUE_EXIT_CODE,
    );

    match missing {
        MissingParameterPolicy::Ignore => {
            script.push_str("if parm is not None:\n");
            for line in SET_FROM_TEXT {
                let _ = writeln!(script, "    {}", line);
            }
        }
        MissingParameterPolicy::Error => {
            let _ = write!(
                script,
                "if parm is None:\n    \
                 sys.stderr.write('No parameter %s on %s\\n' % ({parm}, {node}))\n    \
                 sys.exit({code})\n",
                parm = py_literal(parameter),
                node = py_literal(node),
                code = MISSING_PARAMETER_EXIT_CODE,
            );
            for line in SET_FROM_TEXT {
                let _ = writeln!(script, "{}", line);
            }
        }
    }

    script.push_str("hou.hipFile.save()\n");
    script
}
