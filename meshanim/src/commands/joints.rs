//! `joints` command: joint hierarchy as a tree

use anyhow::Result;
use skinned_mesh::{Joint, SkinnedMesh};
use std::path::Path;

use crate::utils::{NodeType, TreeNode, TreeOptions, render_tree};

pub fn execute(path: &Path, depth: Option<usize>, no_color: bool) -> Result<()> {
    let mesh = super::load(path)?;
    let file_name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

    let mut root = TreeNode::new(file_name, NodeType::Root)
        .with_metadata("joints", mesh.joint_count())
        .with_metadata("format", mesh.format());
    for index in mesh.hierarchy().roots() {
        root = root.add_child(joint_node(&mesh, index));
    }

    let options = TreeOptions {
        max_depth: depth,
        no_color,
    };
    print!("{}", render_tree(&root, &options));
    Ok(())
}

fn joint_node(mesh: &SkinnedMesh, index: usize) -> TreeNode {
    let Some(joint) = mesh.hierarchy().joint(index) else {
        return TreeNode::new(format!("#{index}"), NodeType::Empty);
    };

    let name = if joint.name.is_empty() {
        format!("<unnamed #{index}>")
    } else {
        joint.name.clone()
    };
    let mut node = TreeNode::new(name, node_type(joint));

    if joint.has_keys() {
        node = node.with_metadata(
            "keys",
            format!(
                "{}p/{}r/{}s",
                joint.position_keys.len(),
                joint.rotation_keys.len(),
                joint.scale_keys.len()
            ),
        );
    }
    if !joint.weights.is_empty() {
        node = node.with_metadata("weights", joint.weights.len());
    }
    if !joint.attached_buffers.is_empty() {
        node = node.with_metadata("buffers", joint.attached_buffers.len());
    }

    for &child in &joint.children {
        node = node.add_child(joint_node(mesh, child));
    }
    node
}

fn node_type(joint: &Joint) -> NodeType {
    if !joint.weights.is_empty() {
        NodeType::Bone
    } else if joint.has_keys() || !joint.attached_buffers.is_empty() {
        NodeType::Joint
    } else {
        NodeType::Empty
    }
}
