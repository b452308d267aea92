//! Estimate tree
//!
//! Budget estimates form a tree rooted at a single, immutable root node.
//! A node with children is a "category": categories carry no amount, due
//! date, or finished flag of their own; those live on the leaves and roll up
//! through the tree for analytics.
//!
//! The tree is stored as an arena: a flat map of nodes keyed by estimate ID,
//! with parent/child links held as IDs rather than owning references. All
//! structural operations go through [`EstimateTree`].

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::currency::Currency;
use super::money::Money;
use crate::error::{Error, Result};
use crate::services::assigner::Actuals;

/// Reserved ID of the root estimate
pub const ROOT_ESTIMATE_ID: u32 = 0;

/// Estimate type, dictating whether activity increases or decreases funds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimateType {
    /// Expected increase in funds (wages, gifts received)
    Income,
    /// Expected decrease in funds (purchases, gifts given)
    Expense,
    /// Transfer of funds between accounts
    Transfer,
    /// Tree root only
    Root,
}

/// When activity against an estimate is expected to have occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DueDate {
    /// A fixed calendar date
    On(NaiveDate),
    /// Days after the start of the budgeting period
    Offset(i64),
}

impl DueDate {
    /// Resolve to a calendar date, given the budgeting period start.
    /// An offset without a known period start cannot be resolved.
    pub fn resolve(&self, period_start: Option<NaiveDate>) -> Option<NaiveDate> {
        match self {
            DueDate::On(date) => Some(*date),
            DueDate::Offset(days) => period_start.map(|start| start + Duration::days(*days)),
        }
    }
}

/// A single node of the estimate tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Estimate {
    /// Unique estimate ID (0 is the root)
    pub id: u32,

    /// Estimate name
    pub name: String,

    /// Longer description
    #[serde(default)]
    pub description: String,

    /// Estimate type
    pub estimate_type: EstimateType,

    /// Estimated amount (always zero for categories and the root)
    pub amount: Money,

    /// Optional due date for the estimated activity
    pub due_date: Option<DueDate>,

    /// Whether activity against this estimate is finished
    #[serde(default)]
    pub finished: bool,

    parent: Option<u32>,
    #[serde(default)]
    children: Vec<u32>,
}

impl Estimate {
    /// Parent estimate ID, `None` for the root
    pub fn parent(&self) -> Option<u32> {
        self.parent
    }

    /// Child estimate IDs in display order
    pub fn children(&self) -> &[u32] {
        &self.children
    }

    /// Whether this node has children
    pub fn is_category(&self) -> bool {
        !self.children.is_empty()
    }

    /// Whether this node is the tree root
    pub fn is_root(&self) -> bool {
        self.id == ROOT_ESTIMATE_ID && self.parent.is_none()
    }
}

/// Progress of an estimate: actual activity compared against the estimate
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Total estimated amount over the subtree
    pub estimated: Money,
    /// Total actual amount over the subtree
    pub actual: Money,
    /// Informational note (e.g., upcoming due date)
    pub note: Option<String>,
    /// Whether activity is within the estimate
    pub healthy: bool,
}

/// Impact of an estimate on the estimated, actual, and expected balances
#[derive(Debug, Clone, PartialEq)]
pub struct Impact {
    /// Signed estimated contribution to the ending balance
    pub estimated: Money,
    /// Signed actual contribution to the ending balance
    pub actual: Money,
    /// Conservative expected contribution to the ending balance
    pub expected: Money,
}

/// Field values for constructing an estimate loaded from storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateDefinition {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub estimate_type: EstimateType,
    pub amount: Money,
    pub due_date: Option<DueDate>,
    #[serde(default)]
    pub finished: bool,
}

/// Arena-backed tree of budget estimates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateTree {
    nodes: HashMap<u32, Estimate>,
}

impl EstimateTree {
    /// Create a new tree containing only the root estimate
    pub fn new(currency: Currency) -> Self {
        let root = Estimate {
            id: ROOT_ESTIMATE_ID,
            name: "Root".into(),
            description: String::new(),
            estimate_type: EstimateType::Root,
            amount: Money::zero(currency),
            due_date: None,
            finished: false,
            parent: None,
            children: Vec::new(),
        };
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_ESTIMATE_ID, root);
        Self { nodes }
    }

    /// The root estimate
    pub fn root(&self) -> &Estimate {
        &self.nodes[&ROOT_ESTIMATE_ID]
    }

    /// Number of estimates in the tree, including the root
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds only the root
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Find an estimate by ID
    pub fn find(&self, id: u32) -> Option<&Estimate> {
        self.nodes.get(&id)
    }

    fn get(&self, id: u32) -> Result<&Estimate> {
        self.nodes
            .get(&id)
            .ok_or_else(|| Error::estimate_not_found(id.to_string()))
    }

    fn get_mut(&mut self, id: u32) -> Result<&mut Estimate> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| Error::estimate_not_found(id.to_string()))
    }

    /// Child of `id` at the given index
    pub fn child_at(&self, id: u32, index: usize) -> Option<&Estimate> {
        self.find(id)
            .and_then(|node| node.children.get(index))
            .and_then(|child| self.find(*child))
    }

    /// Index of `child_id` within its parent's children
    pub fn index_of(&self, child_id: u32) -> Option<usize> {
        let child = self.find(child_id)?;
        let parent = self.find(child.parent?)?;
        parent.children.iter().position(|&c| c == child_id)
    }

    /// Create a new child under `parent_id`, seeded from the parent's
    /// current amount, type, due date, and finished state (the root seeds
    /// Expense children). The parent is coerced to category form.
    ///
    /// Returns the new child's ID.
    pub fn add_child(&mut self, parent_id: u32, id: u32, name: impl Into<String>) -> Result<u32> {
        let parent = self.get(parent_id)?.clone();
        let definition = EstimateDefinition {
            id,
            name: name.into(),
            description: parent.description.clone(),
            estimate_type: if parent.estimate_type == EstimateType::Root {
                EstimateType::Expense
            } else {
                parent.estimate_type
            },
            amount: parent.amount.clone(),
            due_date: parent.due_date,
            finished: parent.finished,
        };
        self.add_child_with(parent_id, definition, None)
    }

    /// Create a new child under `parent_id` with explicit field values,
    /// optionally at a specific index among the parent's children. Used when
    /// reconstructing a tree from storage.
    pub fn add_child_with(
        &mut self,
        parent_id: u32,
        definition: EstimateDefinition,
        index: Option<usize>,
    ) -> Result<u32> {
        if self.nodes.contains_key(&definition.id) {
            return Err(Error::Validation(format!(
                "Duplicate estimate ID: {}",
                definition.id
            )));
        }
        if definition.estimate_type == EstimateType::Root {
            return Err(Error::Validation(
                "Only the root estimate may have the Root type".into(),
            ));
        }
        self.get(parent_id)?;

        // Becoming a parent resets category-incompatible fields
        self.make_category_compatible(parent_id);

        let id = definition.id;
        let node = Estimate {
            id,
            name: definition.name,
            description: definition.description,
            estimate_type: definition.estimate_type,
            amount: definition.amount,
            due_date: definition.due_date,
            finished: definition.finished,
            parent: Some(parent_id),
            children: Vec::new(),
        };
        self.nodes.insert(id, node);

        let parent = self.get_mut(parent_id)?;
        let index = index.unwrap_or(parent.children.len()).min(parent.children.len());
        parent.children.insert(index, id);
        Ok(id)
    }

    fn make_category_compatible(&mut self, id: u32) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.amount = Money::zero(node.amount.currency().clone());
            node.due_date = None;
            node.finished = false;
        }
    }

    /// Rename an estimate. The root's name never changes.
    pub fn set_name(&mut self, id: u32, name: impl Into<String>) -> Result<()> {
        let node = self.get_mut(id)?;
        if !node.is_root() {
            node.name = name.into();
        }
        Ok(())
    }

    /// Change an estimate's description. The root's description never changes.
    pub fn set_description(&mut self, id: u32, description: impl Into<String>) -> Result<()> {
        let node = self.get_mut(id)?;
        if !node.is_root() {
            node.description = description.into();
        }
        Ok(())
    }

    /// Change an estimate's type, cascading the change to every descendant.
    /// The root keeps the Root type.
    pub fn set_type(&mut self, id: u32, estimate_type: EstimateType) -> Result<()> {
        if estimate_type == EstimateType::Root {
            return Err(Error::Validation(
                "Only the root estimate may have the Root type".into(),
            ));
        }
        self.get(id)?;
        for node_id in self.subtree_ids(id) {
            let node = self.get_mut(node_id)?;
            if !node.is_root() {
                node.estimate_type = estimate_type;
            }
        }
        Ok(())
    }

    /// Change a leaf estimate's amount. No-op for the root and categories.
    pub fn set_amount(&mut self, id: u32, amount: Money) -> Result<()> {
        let node = self.get_mut(id)?;
        if !node.is_root() && !node.is_category() {
            node.amount = amount;
        }
        Ok(())
    }

    /// Change a leaf estimate's due date. No-op for the root and categories.
    pub fn set_due_date(&mut self, id: u32, due_date: Option<DueDate>) -> Result<()> {
        let node = self.get_mut(id)?;
        if !node.is_root() && !node.is_category() {
            node.due_date = due_date;
        }
        Ok(())
    }

    /// Change the finished state, cascading over the subtree. Only leaves
    /// actually carry the flag; the root and categories are skipped.
    pub fn set_finished(&mut self, id: u32, finished: bool) -> Result<()> {
        self.get(id)?;
        for node_id in self.subtree_ids(id) {
            let node = self.get_mut(node_id)?;
            if !node.is_root() && !node.is_category() {
                node.finished = finished;
            }
        }
        Ok(())
    }

    /// Delete an estimate and its entire subtree, children before parents.
    /// The root cannot be deleted.
    pub fn remove(&mut self, id: u32) -> Result<()> {
        let node = self.get(id)?;
        if node.is_root() {
            return Err(Error::Validation("The root estimate cannot be deleted".into()));
        }
        let parent_id = node.parent;

        // Bottom-up: reversed pre-order visits every child before its parent
        for node_id in self.subtree_ids(id).into_iter().rev() {
            self.nodes.remove(&node_id);
        }

        if let Some(parent_id) = parent_id {
            if let Some(parent) = self.nodes.get_mut(&parent_id) {
                parent.children.retain(|&c| c != id);
            }
        }
        Ok(())
    }

    /// Move an estimate (and its subtree) under a new parent, optionally at
    /// a specific child index. The new parent is coerced to category form,
    /// and its type cascades onto the moved subtree.
    pub fn move_to(&mut self, id: u32, new_parent_id: u32, index: Option<usize>) -> Result<()> {
        let node = self.get(id)?;
        if node.is_root() {
            return Err(Error::Validation("The root estimate cannot be moved".into()));
        }
        let old_parent_id = node.parent.expect("non-root estimate has a parent");
        self.get(new_parent_id)?;
        if self.subtree_ids(id).contains(&new_parent_id) {
            return Err(Error::Validation(
                "An estimate cannot be moved into its own subtree".into(),
            ));
        }

        if old_parent_id != new_parent_id {
            self.make_category_compatible(new_parent_id);

            // Adopt the new parent's type across the moved subtree
            let parent_type = self.get(new_parent_id)?.estimate_type;
            if parent_type != EstimateType::Root {
                self.set_type(id, parent_type)?;
            }

            let old_parent = self.get_mut(old_parent_id)?;
            old_parent.children.retain(|&c| c != id);

            let new_parent = self.get_mut(new_parent_id)?;
            let index = index
                .unwrap_or(new_parent.children.len())
                .min(new_parent.children.len());
            new_parent.children.insert(index, id);

            self.get_mut(id)?.parent = Some(new_parent_id);
        } else if let Some(index) = index {
            let parent = self.get_mut(old_parent_id)?;
            parent.children.retain(|&c| c != id);
            let index = index.min(parent.children.len());
            parent.children.insert(index, id);
        }
        Ok(())
    }

    /// IDs of the subtree rooted at `id`, in pre-order (parents first)
    pub fn subtree_ids(&self, id: u32) -> Vec<u32> {
        let mut ids = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                ids.push(current);
                // Reverse keeps pre-order traversal in child order
                stack.extend(node.children.iter().rev());
            }
        }
        ids
    }

    // -- Analytics

    /// Recursive sum of estimated amounts over the subtree at `id`
    pub fn total_estimated(&self, id: u32) -> Result<Money> {
        let node = self.get(id)?;
        let mut sum = node.amount.clone();
        for &child in &node.children {
            sum += self.total_estimated(child)?;
        }
        Ok(sum)
    }

    /// Recursive sum of actual amounts over the subtree at `id`. Leaves
    /// look up their accumulated actual (zero if absent); categories sum
    /// their children.
    pub fn total_actual(&self, id: u32, actuals: &Actuals) -> Result<Money> {
        let node = self.get(id)?;
        if node.is_category() {
            let mut sum = Money::zero(node.amount.currency().clone());
            for &child in &node.children {
                sum += self.total_actual(child, actuals)?;
            }
            Ok(sum)
        } else {
            Ok(actuals
                .value(id)
                .cloned()
                .unwrap_or_else(|| Money::zero(node.amount.currency().clone())))
        }
    }

    /// Progress of the estimate at `id` against actual activity
    pub fn progress(
        &self,
        id: u32,
        actuals: &Actuals,
        period_start: Option<NaiveDate>,
    ) -> Result<Progress> {
        let node = self.get(id)?;

        // The root is never populated
        if node.is_root() {
            let zero = Money::zero(node.amount.currency().clone());
            return Ok(Progress {
                estimated: zero.clone(),
                actual: zero,
                note: None,
                healthy: true,
            });
        }

        let estimated = self.total_estimated(id)?;
        let actual = self.total_actual(id, actuals)?;

        let note = if actual.is_zero() {
            node.due_date
                .and_then(|due| due.resolve(period_start))
                .map(|date| format!("Due on {}", date))
        } else {
            None
        };

        let healthy = match node.estimate_type {
            EstimateType::Expense | EstimateType::Transfer => actual <= estimated,
            EstimateType::Income => actual >= estimated,
            EstimateType::Root => true,
        };

        Ok(Progress {
            estimated,
            actual,
            note,
            healthy,
        })
    }

    /// Impact of the estimate at `id` on the ending balances. Categories
    /// have no impact of their own.
    pub fn impact(&self, id: u32, actuals: &Actuals) -> Result<Impact> {
        let node = self.get(id)?;
        let zero = Money::zero(node.amount.currency().clone());

        if node.is_category() {
            return Ok(Impact {
                estimated: zero.clone(),
                actual: zero.clone(),
                expected: zero,
            });
        }

        let actual = actuals
            .value(id)
            .cloned()
            .unwrap_or_else(|| zero.clone());

        let (estimated_impact, actual_impact) = match node.estimate_type {
            // Expenses subtract from the balance
            EstimateType::Expense => (-node.amount.clone(), -actual.clone()),
            // Income adds to the balance
            EstimateType::Income => (node.amount.clone(), actual.clone()),
            // Transfers and the root contribute nothing
            EstimateType::Transfer | EstimateType::Root => (zero.clone(), zero.clone()),
        };

        let expected = if node.finished {
            actual_impact.clone()
        } else if actual.cmp_amount(&node.amount) == std::cmp::Ordering::Greater {
            // Actual already exceeds the estimate
            actual_impact.clone()
        } else {
            estimated_impact.clone()
        };

        Ok(Impact {
            estimated: estimated_impact,
            actual: actual_impact,
            expected,
        })
    }
}

impl Default for EstimateTree {
    fn default() -> Self {
        Self::new(Currency::default())
    }
}
