//! Layout table unwrapping
//!
//! Newsletter and marketing mail nests its content inside single-column
//! tables that exist only for visual arrangement. Markdown renderers turn
//! those into unreadable pipe tables, so they are flattened here before
//! conversion. Tables that look like data (header cells, more than one column,
//! or many uniform rows) are left exactly as they are.
//!
//! The document is held in scraper's arena tree: nodes live in one vector and
//! refer to each other by [`NodeId`], so rewriting never fights the borrow
//! checker over parent links.

use ego_tree::iter::Edge;
use ego_tree::{NodeId, NodeRef, Tree};
use html5ever::serialize::{serialize, SerializeOpts};
use scraper::node::Text;
use scraper::{Html, Node};

/// Safety bound on simplification passes; nesting converges long before this
const MAX_PASSES: usize = 10;

/// Single-column tables with more content rows than this may be data
const CONTENT_ROW_THRESHOLD: usize = 5;

/// Entity text some senders double-escape into blank cells
const BLANK_PLACEHOLDER: &str = "&nbsp;";

const TABLE_TAGS: [&str; 7] = ["table", "tbody", "thead", "tfoot", "tr", "td", "th"];

/// Remove single-column layout tables from an HTML document.
///
/// Never fails: input that cannot be parsed or rendered is returned as is.
/// Running the result through again yields the same bytes.
pub fn unwrap_table_layout(html: &[u8]) -> Vec<u8> {
    let Ok(source) = std::str::from_utf8(html) else {
        tracing::debug!("HTML body is not valid UTF-8, skipping table unwrapping");
        return html.to_vec();
    };

    let mut rendered = match simplify_document(source) {
        Ok(rendered) => rendered,
        Err(e) => {
            tracing::warn!("Failed to render simplified HTML, keeping original: {}", e);
            return html.to_vec();
        }
    };

    // Splicing can leave nesting the parser would not build itself, such as
    // `<p>` inside `<p>`. Re-parse until the rendered form is stable.
    for _ in 1..MAX_PASSES {
        let Ok(current) = std::str::from_utf8(&rendered) else {
            break;
        };
        match simplify_document(current) {
            Ok(again) if again == rendered => return rendered,
            Ok(again) => rendered = again,
            Err(e) => {
                tracing::warn!("Failed to re-render simplified HTML: {}", e);
                return rendered;
            }
        }
    }

    tracing::warn!("Simplified HTML still changed after {} re-parses", MAX_PASSES);
    rendered
}

/// Parse, run passes until nothing changes, and render.
fn simplify_document(source: &str) -> std::io::Result<Vec<u8>> {
    let mut document = Html::parse_document(source);

    let mut converged = false;
    for pass in 1..=MAX_PASSES {
        if !simplify_pass(&mut document.tree) {
            converged = true;
            break;
        }
        tracing::trace!(pass, "unwrapped layout tables");
    }

    if !converged {
        tracing::warn!(
            "Table unwrapping stopped after {} passes without reaching a fixed point",
            MAX_PASSES
        );
    }

    render(&document)
}

fn render(document: &Html) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    serialize(&mut buf, document, SerializeOpts::default())?;
    Ok(buf)
}

/// One bottom-up pass. Returns whether any table was unwrapped.
///
/// Nodes are visited in post-order (children before their parent), captured
/// up front, so nodes inserted by an unwrap are not revisited in the same pass.
fn simplify_pass(tree: &mut Tree<Node>) -> bool {
    let order: Vec<NodeId> = tree
        .root()
        .traverse()
        .filter_map(|edge| match edge {
            Edge::Close(node) => Some(node.id()),
            Edge::Open(_) => None,
        })
        .collect();

    let mut changed = false;
    for id in order {
        let unwrap = match tree.get(id) {
            Some(node) if is_element(node, "table") => should_unwrap_table(node),
            _ => false,
        };

        if unwrap && unwrap_table(tree, id) {
            changed = true;
        }
    }

    changed
}

/// Decide whether a table is presentational. Rule order matters: a header
/// cell beats an id that looks structural.
fn should_unwrap_table(table: NodeRef<'_, Node>) -> bool {
    if has_header_cells(table) {
        return false;
    }

    if max_cells_per_row(table) > 1 {
        return false;
    }

    if has_layout_id(table) {
        return true;
    }

    if count_content_rows(table) > CONTENT_ROW_THRESHOLD && has_uniform_rows(table) {
        return false;
    }

    true
}

fn has_header_cells(table: NodeRef<'_, Node>) -> bool {
    table
        .descendants()
        .any(|node| is_element(node, "th") || is_element(node, "thead"))
}

fn max_cells_per_row(table: NodeRef<'_, Node>) -> usize {
    rows(table).map(cells_in_row).max().unwrap_or(0)
}

fn has_layout_id(table: NodeRef<'_, Node>) -> bool {
    table
        .value()
        .as_element()
        .and_then(|element| element.attr("id"))
        .is_some_and(|id| id == "main" || id.contains("layout") || id.contains("wrapper"))
}

fn count_content_rows(table: NodeRef<'_, Node>) -> usize {
    rows(table).filter(|row| has_text_content(*row)).count()
}

/// True when there are at least two rows and all have the same cell count
fn has_uniform_rows(table: NodeRef<'_, Node>) -> bool {
    let counts: Vec<usize> = rows(table).map(cells_in_row).collect();
    match counts.split_first() {
        Some((first, rest)) if !rest.is_empty() => rest.iter().all(|count| count == first),
        _ => false,
    }
}

fn rows<'a>(table: NodeRef<'a, Node>) -> impl Iterator<Item = NodeRef<'a, Node>> {
    table.descendants().filter(|node| is_element(*node, "tr"))
}

fn cells_in_row(row: NodeRef<'_, Node>) -> usize {
    row.children()
        .filter(|cell| is_element(*cell, "td") || is_element(*cell, "th"))
        .count()
}

fn has_text_content(node: NodeRef<'_, Node>) -> bool {
    node.descendants().any(|n| match n.value() {
        Node::Text(text) => {
            let trimmed = text.trim();
            !trimmed.is_empty() && trimmed != BLANK_PLACEHOLDER
        }
        _ => false,
    })
}

/// A piece of table content to re-insert in place of the table
enum Fragment {
    /// Deep copy of an existing element or text node
    Copy(NodeId),
    /// Newline closing a row that produced content
    RowBreak,
}

/// Replace `table_id` in its parent with the table's content.
/// Returns false when the table has no parent to splice into.
fn unwrap_table(tree: &mut Tree<Node>, table_id: NodeId) -> bool {
    let fragments = match tree.get(table_id) {
        Some(table) if table.parent().is_some() => {
            let mut fragments = Vec::new();
            extract_table_content(table, &mut fragments);
            fragments
        }
        _ => return false,
    };

    for fragment in fragments {
        let replacement = match fragment {
            Fragment::Copy(source) => match clone_subtree(tree, source) {
                Some(id) => id,
                None => continue,
            },
            Fragment::RowBreak => tree
                .orphan(Node::Text(Text { text: "\n".into() }))
                .id(),
        };

        if let Some(mut table) = tree.get_mut(table_id) {
            table.insert_id_before(replacement);
        }
    }

    if let Some(mut table) = tree.get_mut(table_id) {
        table.detach();
    }

    true
}

/// Flatten table machinery, keeping everything else as whole units.
fn extract_table_content(node: NodeRef<'_, Node>, out: &mut Vec<Fragment>) {
    match node.value() {
        Node::Element(element) if is_table_tag(element.name()) => {
            let before = out.len();
            for child in node.children() {
                extract_table_content(child, out);
            }
            if element.name() == "tr" && out.len() > before {
                out.push(Fragment::RowBreak);
            }
        }
        Node::Element(_) => out.push(Fragment::Copy(node.id())),
        Node::Text(text) if !text.trim().is_empty() => out.push(Fragment::Copy(node.id())),
        _ => {}
    }
}

/// Copy a subtree into fresh, detached arena nodes and return the new root.
fn clone_subtree(tree: &mut Tree<Node>, source: NodeId) -> Option<NodeId> {
    let value = tree.get(source)?.value().clone();
    let clone_root = tree.orphan(value).id();

    let mut pending = vec![(source, clone_root)];
    while let Some((from, to)) = pending.pop() {
        let children: Vec<(NodeId, Node)> = tree
            .get(from)?
            .children()
            .map(|child| (child.id(), child.value().clone()))
            .collect();

        for (child_id, value) in children {
            let copy_id = tree.get_mut(to)?.append(value).id();
            pending.push((child_id, copy_id));
        }
    }

    Some(clone_root)
}

fn is_element(node: NodeRef<'_, Node>, tag: &str) -> bool {
    node.value()
        .as_element()
        .is_some_and(|element| element.name() == tag)
}

fn is_table_tag(tag: &str) -> bool {
    TABLE_TAGS.contains(&tag)
}
