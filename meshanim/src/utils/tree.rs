//! Tree rendering for joint hierarchies

use console::Style;
use std::fmt::Write;

/// A node in a rendered tree
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub name: String,
    pub node_type: NodeType,
    pub children: Vec<TreeNode>,
    /// Short `key:value` annotations printed after the name, in order
    pub metadata: Vec<(String, String)>,
}

/// Kinds of nodes, used for icons and colors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// The file itself
    Root,
    /// Joint that carries skin weights
    Bone,
    /// Joint that only carries keyframes or attached buffers
    Joint,
    /// Joint with neither weights nor keys
    Empty,
}

/// Options for tree rendering
#[derive(Debug, Clone, Default)]
pub struct TreeOptions {
    pub max_depth: Option<usize>,
    pub no_color: bool,
}

impl TreeNode {
    pub fn new(name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            name: name.into(),
            node_type,
            children: Vec::new(),
            metadata: Vec::new(),
        }
    }

    pub fn add_child(mut self, child: TreeNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.push((key.to_string(), value.to_string()));
        self
    }
}

impl NodeType {
    pub fn icon(&self) -> &'static str {
        match self {
            NodeType::Root => "📁",
            NodeType::Bone => "🦴",
            NodeType::Joint => "🔗",
            NodeType::Empty => "·",
        }
    }

    pub fn style(&self, no_color: bool) -> Style {
        if no_color {
            Style::new()
        } else {
            match self {
                NodeType::Root => Style::new().bold().cyan(),
                NodeType::Bone => Style::new().green(),
                NodeType::Joint => Style::new().yellow(),
                NodeType::Empty => Style::new().dim(),
            }
        }
    }
}

/// Render a tree structure to a string
pub fn render_tree(root: &TreeNode, options: &TreeOptions) -> String {
    let mut output = String::new();
    render_node(root, &mut output, "", true, 0, options);
    output
}

fn render_node(
    node: &TreeNode,
    output: &mut String,
    prefix: &str,
    is_last: bool,
    depth: usize,
    options: &TreeOptions,
) {
    if let Some(max_depth) = options.max_depth
        && depth > max_depth
    {
        return;
    }

    let connector = if depth == 0 {
        ""
    } else if is_last {
        "└── "
    } else {
        "├── "
    };
    let style = node.node_type.style(options.no_color);
    let _ = write!(
        output,
        "{}{}{} {}",
        prefix,
        connector,
        node.node_type.icon(),
        style.apply_to(&node.name)
    );
    if !node.metadata.is_empty() {
        let parts: Vec<String> = node
            .metadata
            .iter()
            .map(|(key, value)| format!("{key}:{value}"))
            .collect();
        let meta_style = if options.no_color {
            Style::new()
        } else {
            Style::new().dim()
        };
        let _ = write!(output, " {}", meta_style.apply_to(format!("[{}]", parts.join(", "))));
    }
    output.push('\n');

    let new_prefix = if depth == 0 {
        String::new()
    } else if is_last {
        format!("{prefix}    ")
    } else {
        format!("{prefix}│   ")
    };

    if let Some(max_depth) = options.max_depth
        && depth == max_depth
        && !node.children.is_empty()
    {
        let _ = writeln!(output, "{new_prefix}└── … {} more", node.children.len());
        return;
    }

    for (i, child) in node.children.iter().enumerate() {
        let is_last_child = i == node.children.len() - 1;
        render_node(child, output, &new_prefix, is_last_child, depth + 1, options);
    }
}
