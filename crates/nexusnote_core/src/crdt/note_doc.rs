//! Rich-text note CRDT.
//!
//! This module provides `NoteDoc`, a Y.Doc holding a note's rich-text tree in
//! the root `XmlFragment` used by the editor (Tiptap/y-prosemirror name it
//! `"default"`). It exposes the operations the stores and the sync engine rely
//! on: full/incremental encoding, origin-tagged update application, update
//! observation, plain-text projection and structural replacement of the tree.

use std::sync::Arc;

use yrs::types::text::{Diff, YChange};
use yrs::types::xml::{XmlElementPrelim, XmlFragment, XmlOut, XmlTextPrelim};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{
    Any, Doc, Out, ReadTxn, StateVector, Text, Transact, TransactionMut, Update, Xml,
    XmlElementRef, XmlFragmentRef, XmlTextRef,
};

use super::types::UpdateOrigin;
use crate::error::{NexusError, Result};

/// Name of the root Y.XmlFragment holding the note content.
pub const CONTENT_FRAGMENT_NAME: &str = "default";

/// Element tag used for plain paragraphs.
pub const PARAGRAPH_TAG: &str = "paragraph";

/// A CRDT document for a single note.
///
/// # Example
///
/// ```ignore
/// use nexusnote_core::crdt::{NoteDoc, UpdateOrigin};
///
/// let doc = NoteDoc::new();
/// doc.push_paragraph("Hello");
///
/// let copy = NoteDoc::new();
/// copy.apply_update(&doc.encode_state_as_update(), UpdateOrigin::Remote)?;
/// assert_eq!(copy.plain_text(), "Hello");
/// ```
pub struct NoteDoc {
    doc: Doc,
    content: XmlFragmentRef,
}

impl Default for NoteDoc {
    fn default() -> Self {
        Self::new()
    }
}

impl NoteDoc {
    /// Create a new empty note document.
    pub fn new() -> Self {
        let doc = Doc::new();
        let content = doc.get_or_insert_xml_fragment(CONTENT_FRAGMENT_NAME);
        Self { doc, content }
    }

    /// Create a detached document from an encoded state.
    pub fn from_state(state: &[u8]) -> Result<Self> {
        let note = Self::new();
        if !state.is_empty() {
            note.apply_update(state, UpdateOrigin::Storage)?;
        }
        Ok(note)
    }

    /// The underlying yrs document (for collaboration transports).
    pub fn doc(&self) -> &Doc {
        &self.doc
    }

    /// The root content fragment.
    pub fn content(&self) -> &XmlFragmentRef {
        &self.content
    }

    // ==================== Projection ====================

    /// Plain-text projection of the content: one line per block.
    pub fn plain_text(&self) -> String {
        let txn = self.doc.transact();
        let mut lines = Vec::new();
        collect_blocks(&self.content, &txn, &mut lines);
        lines.join("\n")
    }

    /// Number of top-level nodes in the content fragment.
    pub fn block_count(&self) -> u32 {
        let txn = self.doc.transact();
        self.content.len(&txn)
    }

    /// Whether the content fragment has no nodes.
    pub fn is_empty(&self) -> bool {
        self.block_count() == 0
    }

    // ==================== Sync Operations ====================

    /// Encode the current state vector.
    pub fn encode_state_vector(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.state_vector().encode_v1()
    }

    /// Encode the full state as an update.
    pub fn encode_state_as_update(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    /// Encode the diff between current state and a remote state vector.
    pub fn encode_diff(&self, remote_state_vector: &[u8]) -> Result<Vec<u8>> {
        let sv = StateVector::decode_v1(remote_state_vector)
            .map_err(|e| NexusError::Crdt(format!("Failed to decode state vector: {}", e)))?;
        let txn = self.doc.transact();
        Ok(txn.encode_state_as_update_v1(&sv))
    }

    /// Merge an update, tagging the transaction with `origin`.
    ///
    /// Applying the same update twice leaves the document unchanged.
    pub fn apply_update(&self, update: &[u8], origin: UpdateOrigin) -> Result<()> {
        let decoded = Update::decode_v1(update)
            .map_err(|e| NexusError::Crdt(format!("Failed to decode update: {}", e)))?;
        let mut txn = self.doc.transact_mut_with(origin);
        txn.apply_update(decoded)
            .map_err(|e| NexusError::Crdt(format!("Failed to apply update: {}", e)))?;
        Ok(())
    }

    // ==================== Observers ====================

    /// Observe committed updates together with their origin.
    ///
    /// The callback runs inside the committing transaction, so it must not
    /// open another transaction on this document.
    pub fn observe_updates<F>(&self, callback: F) -> Result<yrs::Subscription>
    where
        F: Fn(&[u8], UpdateOrigin) + Send + Sync + 'static,
    {
        self.doc
            .observe_update_v1(move |txn, event| {
                callback(&event.update, UpdateOrigin::from_yrs(txn.origin()));
            })
            .map_err(|e| NexusError::Crdt(format!("Failed to observe document updates: {:?}", e)))
    }

    // ==================== Editing ====================

    /// Append a paragraph containing `text`.
    pub fn push_paragraph(&self, text: &str) {
        self.push_block(PARAGRAPH_TAG, &[], text);
    }

    /// Append a block element with attributes and a single text run.
    pub fn push_block(&self, tag: &str, attributes: &[(&str, Any)], text: &str) {
        let mut txn = self.doc.transact_mut_with(UpdateOrigin::Local);
        let element = self
            .content
            .push_back(&mut txn, XmlElementPrelim::empty(tag));
        for (name, value) in attributes {
            element.insert_attribute(&mut txn, *name, value.clone());
        }
        if !text.is_empty() {
            element.push_back(&mut txn, XmlTextPrelim::new(text));
        }
    }

    /// Replace the whole content with one paragraph per line of `text`.
    pub fn set_plain_text(&self, text: &str) {
        let mut txn = self.doc.transact_mut_with(UpdateOrigin::Local);
        clear_fragment(&self.content, &mut txn);
        for line in text.split('\n') {
            let element = self
                .content
                .push_back(&mut txn, XmlElementPrelim::empty(PARAGRAPH_TAG));
            if !line.is_empty() {
                element.push_back(&mut txn, XmlTextPrelim::new(line));
            }
        }
    }

    /// Replace the content with a structural copy of `source`'s content.
    ///
    /// The live tree is cleared and repopulated node by node (tags,
    /// attributes, ordering and formatted text runs are preserved), so the
    /// change is expressed as ordinary CRDT operations that merge with
    /// concurrently connected peers.
    pub fn replace_content_from(&self, source: &NoteDoc, origin: UpdateOrigin) {
        let src_txn = source.doc.transact();
        let mut dst_txn = self.doc.transact_mut_with(origin);
        clear_fragment(&self.content, &mut dst_txn);
        clone_children(&source.content, &src_txn, &self.content, &mut dst_txn);
    }
}

impl std::fmt::Debug for NoteDoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteDoc")
            .field("blocks", &self.block_count())
            .finish_non_exhaustive()
    }
}

fn clear_fragment<F: XmlFragment>(fragment: &F, txn: &mut TransactionMut) {
    let len = fragment.len(txn);
    if len > 0 {
        fragment.remove_range(txn, 0, len);
    }
}

/// Deep-copy the children of `src` to the end of `dst`.
fn clone_children<S, D, T>(src: &S, src_txn: &T, dst: &D, dst_txn: &mut TransactionMut)
where
    S: XmlFragment,
    D: XmlFragment,
    T: ReadTxn,
{
    for child in src.children(src_txn) {
        match child {
            XmlOut::Element(element) => {
                let tag: Arc<str> = element.tag().clone();
                let copy = dst.push_back(dst_txn, XmlElementPrelim::empty(tag));
                clone_attributes(&element, src_txn, &copy, dst_txn);
                clone_children(&element, src_txn, &copy, dst_txn);
            }
            XmlOut::Text(text) => {
                let copy = dst.push_back(dst_txn, XmlTextPrelim::new(""));
                clone_text_runs(&text, src_txn, &copy, dst_txn);
            }
            XmlOut::Fragment(fragment) => {
                clone_children(&fragment, src_txn, dst, dst_txn);
            }
        }
    }
}

fn clone_attributes<T: ReadTxn>(
    src: &XmlElementRef,
    src_txn: &T,
    dst: &XmlElementRef,
    dst_txn: &mut TransactionMut,
) {
    for (name, value) in src.attributes(src_txn) {
        match value {
            Out::Any(any) => {
                dst.insert_attribute(dst_txn, name, any);
            }
            other => {
                let value = other.to_string(src_txn);
                dst.insert_attribute(dst_txn, name, value);
            }
        }
    }
}

fn clone_text_runs<T: ReadTxn>(
    src: &XmlTextRef,
    src_txn: &T,
    dst: &XmlTextRef,
    dst_txn: &mut TransactionMut,
) {
    let runs: Vec<Diff<YChange>> = src.diff(src_txn, YChange::identity);
    for run in runs {
        let Out::Any(Any::String(chunk)) = run.insert else {
            log::debug!("Skipping non-text run while cloning note content");
            continue;
        };
        let index = dst.len(dst_txn);
        match run.attributes {
            Some(attrs) => dst.insert_with_attributes(dst_txn, index, &chunk, *attrs),
            None => dst.insert(dst_txn, index, &chunk),
        }
    }
}

/// Text of a text node, ignoring formatting.
fn text_content<T: ReadTxn>(text: &XmlTextRef, txn: &T) -> String {
    let mut out = String::new();
    for run in text.diff(txn, YChange::identity) {
        if let Out::Any(Any::String(chunk)) = run.insert {
            out.push_str(&chunk);
        }
    }
    out
}

/// Flatten a tree into lines: elements with element children are
/// containers, everything else is a block producing one line.
fn collect_blocks<F: XmlFragment, T: ReadTxn>(node: &F, txn: &T, lines: &mut Vec<String>) {
    for child in node.children(txn) {
        match child {
            XmlOut::Element(element) => {
                let has_element_children = element
                    .children(txn)
                    .any(|c| matches!(c, XmlOut::Element(_) | XmlOut::Fragment(_)));
                if has_element_children {
                    collect_blocks(&element, txn, lines);
                } else {
                    lines.push(inline_text(&element, txn));
                }
            }
            XmlOut::Text(text) => lines.push(text_content(&text, txn)),
            XmlOut::Fragment(fragment) => collect_blocks(&fragment, txn, lines),
        }
    }
}

fn inline_text<T: ReadTxn>(element: &XmlElementRef, txn: &T) -> String {
    let mut line = String::new();
    for child in element.children(txn) {
        if let XmlOut::Text(text) = child {
            line.push_str(&text_content(&text, txn));
        }
    }
    line
}
