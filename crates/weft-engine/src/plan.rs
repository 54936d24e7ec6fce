//! Static analysis of a workflow before execution: node construction, link
//! key checks, topological order, and ancestor sets.

use std::collections::{HashMap, HashSet, VecDeque};

use weft_core::error::{Result, WeftError};
use weft_core::workflow::{WorkflowDefinition, WorkflowLink};
use weft_nodes::{NodeInstance, NodeRegistry};

/// A workflow whose nodes are constructed and whose links are checked.
pub struct ExecutionPlan<'w> {
    workflow: &'w WorkflowDefinition,
    instances: HashMap<String, NodeInstance>,
    order: Vec<String>,
}

impl<'w> ExecutionPlan<'w> {
    pub fn build(workflow: &'w WorkflowDefinition, registry: &NodeRegistry) -> Result<Self> {
        workflow.validate()?;

        let instances = workflow
            .nodes
            .iter()
            .map(|n| registry.create(n).map(|inst| (n.id.clone(), inst)))
            .collect::<Result<HashMap<_, _>>>()?;

        for link in &workflow.links {
            check_link(link, &instances)?;
        }

        let order = topological_order(workflow)?;
        Ok(Self {
            workflow,
            instances,
            order,
        })
    }

    pub fn instance(&self, id: &str) -> Option<&NodeInstance> {
        self.instances.get(id)
    }

    /// Node ids, every node after all of its sources.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, id: &str) -> bool {
        self.instances.contains_key(id)
    }

    /// `target` and every node with a path to it. Nodes for which `known`
    /// holds are included but their own sources are not walked.
    pub fn ancestors_of(&self, target: &str, known: impl Fn(&str) -> bool) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([target.to_string()]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) || known(&id) {
                continue;
            }
            for link in self.workflow.links_into(&id) {
                queue.push_back(link.source_id.clone());
            }
        }
        seen
    }

    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a WorkflowLink> + 'a {
        self.workflow.links_into(id)
    }
}

fn check_link(link: &WorkflowLink, instances: &HashMap<String, NodeInstance>) -> Result<()> {
    let (source, target) = match (instances.get(&link.source_id), instances.get(&link.target_id)) {
        (Some(s), Some(t)) => (s, t),
        _ => {
            return Err(WeftError::InvalidWorkflow(format!(
                "link {} -> {} references an unknown node",
                link.source_id, link.target_id
            )))
        }
    };
    if !source.output_type().has_field(&link.source_output_key) {
        return Err(WeftError::InvalidWorkflow(format!(
            "node '{}' has no output field '{}'",
            link.source_id, link.source_output_key
        )));
    }
    if !target.input_type().has_field(&link.target_input_key) {
        return Err(WeftError::InvalidWorkflow(format!(
            "node '{}' has no input field '{}'",
            link.target_id, link.target_input_key
        )));
    }
    Ok(())
}

/// Kahn's algorithm over node ids, ties broken by declaration order.
fn topological_order(workflow: &WorkflowDefinition) -> Result<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> =
        workflow.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    for link in &workflow.links {
        if let Some(d) = in_degree.get_mut(link.target_id.as_str()) {
            *d += 1;
        }
    }

    let mut queue: VecDeque<&str> = workflow
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();
    let mut order = Vec::with_capacity(workflow.nodes.len());

    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        for link in workflow.links_from(id) {
            if let Some(d) = in_degree.get_mut(link.target_id.as_str()) {
                *d -= 1;
                if *d == 0 {
                    queue.push_back(link.target_id.as_str());
                }
            }
        }
    }

    if order.len() < workflow.nodes.len() {
        let stuck: Vec<&str> = workflow
            .nodes
            .iter()
            .map(|n| n.id.as_str())
            .filter(|id| !order.iter().any(|o| o == id))
            .collect();
        return Err(WeftError::InvalidWorkflow(format!(
            "workflow contains a cycle through: {}",
            stuck.join(", ")
        )));
    }
    Ok(order)
}
