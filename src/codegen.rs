//! Text templates describing a circuit in proving-system syntax.
//!
//! Output is illustrative source only; it is never parsed or compiled here.

use std::str::FromStr;

use crate::errors::ComputeError;
use crate::types::{Circuit, CircuitNode};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CodeFormat {
    #[default]
    Summary,
    Circom,
    Noir,
}

impl CodeFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeFormat::Summary => "summary",
            CodeFormat::Circom => "circom",
            CodeFormat::Noir => "noir",
        }
    }
}

impl FromStr for CodeFormat {
    type Err = ComputeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "summary" => Ok(CodeFormat::Summary),
            "circom" => Ok(CodeFormat::Circom),
            "noir" => Ok(CodeFormat::Noir),
            other => Err(ComputeError::validation(
                "Invalid code format",
                vec![format!(
                    "format: expected one of summary, circom, noir; got `{other}`"
                )],
            )),
        }
    }
}

pub fn render(circuit: &Circuit, format: CodeFormat) -> String {
    match format {
        CodeFormat::Summary => render_summary(circuit),
        CodeFormat::Circom => render_circom(circuit),
        CodeFormat::Noir => render_noir(circuit),
    }
}

fn compact(name: &str) -> String {
    name.split_whitespace().collect()
}

fn snake(name: &str) -> String {
    name.to_lowercase().split_whitespace().collect::<Vec<_>>().join("_")
}

fn noir_ident(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' { c } else { '_' })
        .collect()
}

fn module_label(node: &CircuitNode) -> String {
    node.module_type.as_str().to_uppercase()
}

fn render_summary(circuit: &Circuit) -> String {
    let modules: Vec<String> = circuit
        .nodes
        .iter()
        .enumerate()
        .map(|(index, node)| {
            let mut lines = vec![
                format!("  // Module {}: {}", index + 1, node.name),
                format!(
                    "  component {} = {}_MODULE();",
                    snake(&node.name),
                    module_label(node)
                ),
            ];
            lines.extend(node.inputs.iter().map(|input| format!("  signal input {input};")));
            lines.extend(node.outputs.iter().map(|output| format!("  signal output {output};")));
            lines.join("\n")
        })
        .collect();

    format!(
        "// Encrypt Circuit - {name}\n// Generated ZK Circuit Definition\n\ncircuit {compact} {{\n{body}\n}}",
        name = circuit.name,
        compact = compact(&circuit.name),
        body = modules.join("\n\n"),
    )
}

const CIRCOM_HEADER: &str = "// Circom 2.1 ZK Circuit Definition\n// Target: Groth16 / PLONK proving systems";

fn render_circom(circuit: &Circuit) -> String {
    let template = compact(&circuit.name);
    if circuit.nodes.is_empty() {
        return [
            format!("// Encrypt Circuit - {}", circuit.name),
            CIRCOM_HEADER.to_string(),
            "//".to_string(),
            "// Add modules to your circuit to generate code.".to_string(),
            String::new(),
            "pragma circom 2.1.6;".to_string(),
            String::new(),
            "include \"node_modules/circomlib/circuits/poseidon.circom\";".to_string(),
            String::new(),
            format!("template {template}() {{"),
            "    // Add modules to define circuit logic".to_string(),
            "    signal input placeholder;".to_string(),
            "    signal output hash;".to_string(),
            String::new(),
            "    component hasher = Poseidon(1);".to_string(),
            "    hasher.inputs[0] <== placeholder;".to_string(),
            "    hash <== hasher.out;".to_string(),
            "}".to_string(),
            String::new(),
            format!("component main = {template}();"),
        ]
        .join("\n");
    }

    let mut public_inputs = Vec::new();
    let modules: Vec<String> = circuit
        .nodes
        .iter()
        .enumerate()
        .map(|(index, node)| {
            let component = snake(&node.name);
            let inputs: Vec<String> = if node.inputs.is_empty() {
                vec![format!("{component}_in")]
            } else {
                node.inputs
                    .iter()
                    .map(|input| format!("{component}_{input}"))
                    .collect()
            };
            let outputs: Vec<String> = if node.outputs.is_empty() {
                vec![format!("{component}_out")]
            } else {
                node.outputs
                    .iter()
                    .map(|output| format!("{component}_{output}"))
                    .collect()
            };
            if !node.inputs.is_empty() {
                public_inputs.extend(inputs.iter().cloned());
            }

            let mut lines = vec![format!("    // Module {}: {} ({})", index + 1, node.name, node.module_type)];
            lines.extend(inputs.iter().map(|signal| format!("    signal input {signal};")));
            lines.extend(outputs.iter().map(|signal| format!("    signal output {signal};")));
            lines.push(String::new());
            lines.push(format!(
                "    // {} verification logic using Poseidon hash",
                module_label(node)
            ));
            lines.push(format!(
                "    component {component}_hasher = Poseidon({});",
                inputs.len()
            ));
            lines.extend(
                inputs
                    .iter()
                    .enumerate()
                    .map(|(slot, signal)| format!("    {component}_hasher.inputs[{slot}] <== {signal};")),
            );
            lines.push(format!("    {} <== {component}_hasher.out;", outputs[0]));
            lines.join("\n")
        })
        .collect();

    let main = if public_inputs.is_empty() {
        format!("component main = {template}();")
    } else {
        format!(
            "component main {{public [{}]}} = {template}();",
            public_inputs.join(", ")
        )
    };

    format!(
        "// Encrypt Circuit - {name}\n{CIRCOM_HEADER}\n\n\
pragma circom 2.1.6;\n\n\
include \"node_modules/circomlib/circuits/poseidon.circom\";\n\
include \"node_modules/circomlib/circuits/comparators.circom\";\n\n\
template {template}() {{\n{body}\n}}\n\n{main}",
        name = circuit.name,
        body = modules.join("\n\n"),
    )
}

const NOIR_HEADER: &str = "// Noir DSL for Aztec zkSNARK\n// Compatible with: Aztec Network, Barretenberg backend";

/// Poseidon call over the node's parameters, zero-padded to the nearest
/// supported arity. Only the first four inputs are hashed.
fn noir_hash_call(params: &[String]) -> String {
    let (function, arity) = if params.len() <= 2 { ("hash_2", 2) } else { ("hash_4", 4) };
    let mut args: Vec<String> = params.iter().take(arity).cloned().collect();
    args.resize(arity, "0".to_string());
    format!("{function}([{}])", args.join(", "))
}

fn render_noir(circuit: &Circuit) -> String {
    let test_name = noir_ident(&circuit.name.split_whitespace().collect::<Vec<_>>().join("_"));
    if circuit.nodes.is_empty() {
        return [
            format!("// Encrypt Circuit - {}", circuit.name),
            NOIR_HEADER.to_string(),
            "//".to_string(),
            "// Add modules to your circuit to generate verification functions.".to_string(),
            String::new(),
            "fn main(input: pub Field) {".to_string(),
            format!("    // Circuit: {}", circuit.name),
            "    let hash = std::hash::poseidon::bn254::hash_2([input, 0]);".to_string(),
            "    assert(hash != 0);".to_string(),
            "}".to_string(),
            String::new(),
            "#[test]".to_string(),
            format!("fn test_{test_name}() {{"),
            "    main(42);".to_string(),
            "}".to_string(),
        ]
        .join("\n");
    }

    let mut functions = Vec::new();
    let mut main_params = Vec::new();
    let mut main_body = Vec::new();
    let mut sample_args = Vec::new();

    for (index, node) in circuit.nodes.iter().enumerate() {
        let function = snake(&node.name);
        let params: Vec<String> = if node.inputs.is_empty() {
            vec!["input".to_string()]
        } else {
            node.inputs.iter().map(|input| noir_ident(input)).collect()
        };
        let signature = params
            .iter()
            .map(|param| format!("{param}: Field"))
            .collect::<Vec<_>>()
            .join(", ");
        functions.push(format!(
            "/// Module {}: {} ({})\nfn {function}({signature}) -> Field {{\n    // {} verification using Poseidon hash\n    let hash = {};\n    hash\n}}",
            index + 1,
            node.name,
            node.module_type,
            module_label(node),
            noir_hash_call(&params),
        ));

        let arguments: Vec<String> = params
            .iter()
            .map(|param| format!("{function}_{param}"))
            .collect();
        main_params.extend(arguments.iter().map(|argument| format!("    {argument}: pub Field")));
        sample_args.extend(arguments.iter().map(|_| "1"));
        main_body.push(format!(
            "    // Execute {name} module\n    let {function}_result = {function}({});\n    assert({function}_result != 0, \"{name} verification failed\");",
            arguments.join(", "),
            name = node.name,
        ));
    }

    format!(
        "// Encrypt Circuit - {name}\n{NOIR_HEADER}\n//\n// Compile with: nargo compile\n// Prove with: nargo prove\n// Verify with: nargo verify\n\n\
use std::hash::poseidon::bn254::{{hash_2, hash_4}};\n\n\
{functions}\n\n\
/// Main circuit entrypoint\n\
fn main(\n{params}\n) {{\n    // Circuit: {name}\n\n{body}\n}}\n\n\
#[test]\n\
fn test_{test_name}() {{\n    main({samples});\n}}",
        name = circuit.name,
        functions = functions.join("\n\n"),
        params = main_params.join(",\n"),
        body = main_body.join("\n\n"),
        samples = sample_args.join(", "),
    )
}
