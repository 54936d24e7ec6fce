//! Graph rewriting for loop unrolling.

use weft_core::error::{Result, WeftError};
use weft_core::workflow::{WorkflowDefinition, WorkflowLink, WorkflowNode};

/// Copy `template` with every node id suffixed by `_{iteration}` and every
/// link rewritten to the new ids.
pub fn relabel(template: &WorkflowDefinition, iteration: usize) -> WorkflowDefinition {
    let scoped = |id: &str| format!("{}_{}", id, iteration);
    WorkflowDefinition {
        nodes: template
            .nodes
            .iter()
            .map(|n| WorkflowNode {
                id: scoped(&n.id),
                node_type: n.node_type.clone(),
                config: n.config.clone(),
            })
            .collect(),
        links: template
            .links
            .iter()
            .map(|l| WorkflowLink {
                source_id: scoped(&l.source_id),
                source_output_key: l.source_output_key.clone(),
                target_id: scoped(&l.target_id),
                target_input_key: l.target_input_key.clone(),
            })
            .collect(),
    }
}

/// Grow an unrolled loop graph by one iteration of `template`.
///
/// With no accumulated graph, the relabelled clone is the result. Otherwise
/// every link that fed the accumulated OutputNode is redirected to the
/// clone's consumers of the matching InputNode field, one link per consumer.
/// The old OutputNode and the clone's InputNode are dropped with their
/// links, so the result keeps exactly one of each marker.
///
/// Neither argument is modified.
pub fn splice(
    accumulated: Option<&WorkflowDefinition>,
    template: &WorkflowDefinition,
    iteration: usize,
) -> Result<WorkflowDefinition> {
    if template.input_node().is_none() || template.output_node().is_none() {
        return Err(WeftError::BrokenTemplate(
            "loop body must contain an InputNode and an OutputNode".to_string(),
        ));
    }

    let clone = relabel(template, iteration);
    let Some(accumulated) = accumulated else {
        return Ok(clone);
    };

    let old_output = accumulated.output_node().ok_or_else(|| {
        WeftError::BrokenTemplate("accumulated graph lost its OutputNode".to_string())
    })?;
    let clone_input = clone
        .input_node()
        .ok_or_else(|| WeftError::BrokenTemplate("iteration clone has no InputNode".to_string()))?;

    let entry_links: Vec<&WorkflowLink> = clone.links_from(&clone_input.id).collect();

    let mut links = Vec::with_capacity(accumulated.links.len() + clone.links.len());
    for link in &accumulated.links {
        if link.source_id == old_output.id {
            continue;
        }
        if link.target_id != old_output.id {
            links.push(link.clone());
            continue;
        }
        links.extend(
            entry_links
                .iter()
                .filter(|entry| entry.source_output_key == link.target_input_key)
                .map(|entry| WorkflowLink {
                    source_id: link.source_id.clone(),
                    source_output_key: link.source_output_key.clone(),
                    target_id: entry.target_id.clone(),
                    target_input_key: entry.target_input_key.clone(),
                }),
        );
    }
    links.extend(
        clone
            .links
            .iter()
            .filter(|l| l.source_id != clone_input.id && l.target_id != clone_input.id)
            .cloned(),
    );

    let nodes = accumulated
        .nodes
        .iter()
        .filter(|n| n.id != old_output.id)
        .chain(clone.nodes.iter().filter(|n| n.id != clone_input.id))
        .cloned()
        .collect();

    Ok(WorkflowDefinition { nodes, links })
}
