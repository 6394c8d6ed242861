//! Publish ordering: every unit goes out after all the units it references.

use std::collections::HashMap;

use tracing::debug;

use crate::hierarchy::Unit;
use crate::Error;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Indices into `units` in an order where each referenced unit precedes the
/// units that reference it. Ties keep the input order.
pub fn publish_order(units: &[Unit]) -> Result<Vec<usize>, Error> {
    let by_tag: HashMap<&str, usize> = units
        .iter()
        .enumerate()
        .map(|(index, unit)| (unit.d_tag.as_str(), index))
        .collect();

    // Edges point from a dependency to the units it unblocks.
    let mut enables: Vec<Vec<usize>> = vec![Vec::new(); units.len()];
    for (index, unit) in units.iter().enumerate() {
        for reference in &unit.references {
            let Some(&child) = by_tag.get(reference.d_tag.as_str()) else {
                return Err(Error::UnknownReference {
                    from: unit.d_tag.clone(),
                    to: reference.d_tag.clone(),
                });
            };
            enables[child].push(index);
        }
    }

    let mut marks = vec![Mark::Unvisited; units.len()];
    let mut finished = Vec::with_capacity(units.len());

    // Visit roots in reverse so the reversed finish order keeps input order
    // among independent units.
    for start in (0..units.len()).rev() {
        if marks[start] != Mark::Unvisited {
            continue;
        }
        marks[start] = Mark::InProgress;
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

        while let Some((node, next_edge)) = stack.last_mut() {
            let node = *node;
            if let Some(&target) = enables[node].get(*next_edge) {
                *next_edge += 1;
                match marks[target] {
                    Mark::Unvisited => {
                        marks[target] = Mark::InProgress;
                        stack.push((target, 0));
                    }
                    Mark::InProgress => {
                        return Err(Error::CircularDependency {
                            d_tag: units[target].d_tag.clone(),
                        });
                    }
                    Mark::Done => {}
                }
            } else {
                marks[node] = Mark::Done;
                finished.push(node);
                stack.pop();
            }
        }
    }

    finished.reverse();
    debug!(units = finished.len(), "Resolved publish order");
    Ok(finished)
}
