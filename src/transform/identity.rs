//! Built-in engine that copies its input.
//!
//! Understands just enough XSLT to be useful in pipelines and tests:
//! `xsl:include`/`xsl:import` are followed, `xsl:message` elements are
//! delivered when the transform runs, and `xsl:result-document` with an
//! `href` copies the input to that named output as well.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, info};

use super::engine::{
    CompileContext, CompiledTransform, ContextStack, EngineAttributes, ErrorListener, SourceNode,
    TransformEngine, TransformOutputs, Transformer,
};
use super::resolver::resolve_url;
use super::{TransformError, XSLT_NAMESPACE_URI};
use crate::xml::{
    EventBuffer, EventRecorder, Location, Locator, NodeKind, XmlError, XmlEvent, XmlReceiver,
    XmlSource,
};

/// Engine attribute: drop comments from the output.
pub const STRIP_COMMENTS: &str = "strip-comments";

#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityEngine;

impl IdentityEngine {
    pub const NAME: &'static str = "identity";
}

#[derive(Debug, Clone)]
struct Message {
    text: String,
    terminate: bool,
    location: Option<Location>,
}

#[derive(Debug)]
struct CompiledIdentity {
    system_id: Option<String>,
    messages: Arc<[Message]>,
    result_documents: Arc<[String]>,
}

impl TransformEngine for IdentityEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn compile(
        &self,
        context: &mut CompileContext<'_>,
    ) -> Result<Arc<dyn CompiledTransform>, TransformError> {
        let mut recorder = EventRecorder::new(None);
        context.read_stylesheet(&mut recorder)?;
        let top = recorder.finish();
        ensure_stylesheet_root(&top, context)?;

        let mut messages = Vec::new();
        let mut result_documents = Vec::new();
        // Each pending stylesheet carries the URLs of the stylesheets that
        // led to it, itself included.
        let root_chain: Vec<String> =
            context.system_id().map(str::to_string).into_iter().collect();
        let mut pending = vec![(top, root_chain)];
        while let Some((buffer, chain)) = pending.pop() {
            let scan = scan_stylesheet(&buffer);
            for href in scan.includes {
                let base = buffer.system_id().or(context.system_id());
                let url = resolve_url(base, &href)?.to_string();
                if chain.contains(&url) {
                    let message = format!("circular include of `{url}`");
                    let location = buffer.system_id().map(Location::document);
                    context.listener().error(&message, location.as_ref());
                    return Err(TransformError::Engine { message, location });
                }
                let mut recorder = EventRecorder::new(None);
                context.include(buffer.system_id(), &href, &mut recorder)?;
                let mut included_chain = chain.clone();
                included_chain.push(url);
                pending.push((recorder.finish(), included_chain));
            }
            messages.extend(scan.messages);
            result_documents.extend(scan.result_documents);
        }
        debug!(
            messages = messages.len(),
            outputs = result_documents.len(),
            "Compiled identity stylesheet"
        );

        Ok(Arc::new(CompiledIdentity {
            system_id: context.system_id().map(str::to_string),
            messages: messages.into(),
            result_documents: result_documents.into(),
        }))
    }
}

fn ensure_stylesheet_root(
    buffer: &EventBuffer,
    context: &mut CompileContext<'_>,
) -> Result<(), TransformError> {
    let root = buffer.events().find_map(|event| match event {
        XmlEvent::StartElement { name, .. } => Some(name),
        _ => None,
    });
    match root {
        Some(name)
            if name.matches(XSLT_NAMESPACE_URI, "stylesheet")
                || name.matches(XSLT_NAMESPACE_URI, "transform") =>
        {
            Ok(())
        }
        other => {
            let message = match other {
                Some(name) => format!("`{name}` is not a stylesheet root element"),
                None => "stylesheet has no root element".to_string(),
            };
            let location = buffer.system_id().map(Location::document);
            context.listener().error(&message, location.as_ref());
            Err(TransformError::Engine { message, location })
        }
    }
}

#[derive(Default)]
struct Scan {
    includes: Vec<String>,
    messages: Vec<Message>,
    result_documents: Vec<String>,
}

/// Collects includes, messages and result documents of one stylesheet.
fn scan_stylesheet(buffer: &EventBuffer) -> Scan {
    struct Scanner {
        scan: Scan,
        locator: Option<Rc<dyn Locator>>,
        open_message: Option<Message>,
    }

    impl XmlReceiver for Scanner {
        fn set_locator(&mut self, locator: Rc<dyn Locator>) {
            self.locator = Some(locator);
        }

        fn receive(&mut self, event: XmlEvent) -> Result<(), XmlError> {
            match event {
                XmlEvent::StartElement { name, attributes }
                    if name.namespace.as_deref() == Some(XSLT_NAMESPACE_URI) =>
                {
                    match name.local.as_str() {
                        "include" | "import" => {
                            if let Some(href) = attributes.get("href") {
                                self.scan.includes.push(href.to_string());
                            }
                        }
                        "message" => {
                            self.open_message = Some(Message {
                                text: String::new(),
                                terminate: attributes.get("terminate") == Some("yes"),
                                location: self.locator.as_ref().and_then(|l| l.location()),
                            });
                        }
                        "result-document" => {
                            if let Some(href) = attributes.get("href") {
                                self.scan.result_documents.push(href.to_string());
                            }
                        }
                        _ => {}
                    }
                }
                XmlEvent::Characters(text) => {
                    if let Some(message) = self.open_message.as_mut() {
                        message.text.push_str(&text);
                    }
                }
                XmlEvent::EndElement { name } if name.matches(XSLT_NAMESPACE_URI, "message") => {
                    if let Some(mut message) = self.open_message.take() {
                        message.text = message.text.trim().to_string();
                        self.scan.messages.push(message);
                    }
                }
                _ => {}
            }
            Ok(())
        }
    }

    let mut scanner = Scanner {
        scan: Scan::default(),
        locator: None,
        open_message: None,
    };
    // The scanner never fails and the buffer is well formed.
    let _ = buffer.replay(&mut scanner);
    scanner.scan
}

impl CompiledTransform for CompiledIdentity {
    fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    fn new_transformer(&self, attributes: &EngineAttributes) -> Box<dyn Transformer> {
        Box::new(IdentityTransformer {
            messages: Arc::clone(&self.messages),
            result_documents: Arc::clone(&self.result_documents),
            strip_comments: attributes.get(STRIP_COMMENTS).copied().unwrap_or(false),
            message_buffer: None,
            stack: Rc::new(NodeStack::default()),
        })
    }
}

#[derive(Default)]
struct NodeStack(RefCell<Vec<SourceNode>>);

impl ContextStack for NodeStack {
    fn current_nodes(&self) -> Vec<SourceNode> {
        self.0.borrow().iter().rev().cloned().collect()
    }
}

struct IdentityTransformer {
    messages: Arc<[Message]>,
    result_documents: Arc<[String]>,
    strip_comments: bool,
    message_buffer: Option<Rc<RefCell<String>>>,
    stack: Rc<NodeStack>,
}

impl IdentityTransformer {
    fn deliver_messages(&self) -> Result<(), TransformError> {
        for message in self.messages.iter() {
            match &self.message_buffer {
                Some(buffer) => {
                    let mut buffer = buffer.borrow_mut();
                    buffer.push_str(&message.text);
                    buffer.push('\n');
                }
                None => info!(message = %message.text, "xsl:message"),
            }
            if message.terminate {
                return Err(TransformError::Terminated {
                    message: message.text.clone(),
                    location: message.location.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Transformer for IdentityTransformer {
    fn transform(
        &mut self,
        input: &dyn XmlSource,
        outputs: &mut TransformOutputs<'_>,
        _listener: &mut dyn ErrorListener,
    ) -> Result<(), TransformError> {
        self.deliver_messages()?;

        let mut copier = Copier {
            out: outputs.primary(),
            stack: Rc::clone(&self.stack),
            locator: None,
            strip_comments: self.strip_comments,
        };
        input.replay(&mut copier)?;

        for name in self.result_documents.iter() {
            if let Some(out) = outputs.named(name) {
                let mut copier = Copier {
                    out,
                    stack: Rc::new(NodeStack::default()),
                    locator: None,
                    strip_comments: self.strip_comments,
                };
                input.replay(&mut copier)?;
            }
        }
        Ok(())
    }

    fn context_stack(&self) -> Option<Rc<dyn ContextStack>> {
        Some(Rc::clone(&self.stack) as Rc<dyn ContextStack>)
    }

    fn set_message_buffer(&mut self, buffer: Rc<RefCell<String>>) -> bool {
        self.message_buffer = Some(buffer);
        true
    }
}

/// Forwards input events while keeping the context stack in step.
struct Copier<'o> {
    out: &'o mut dyn XmlReceiver,
    stack: Rc<NodeStack>,
    locator: Option<Rc<dyn Locator>>,
    strip_comments: bool,
}

impl XmlReceiver for Copier<'_> {
    // The input locator describes the input, not what this engine emits.
    fn set_locator(&mut self, locator: Rc<dyn Locator>) {
        self.locator = Some(locator);
    }

    fn receive(&mut self, event: XmlEvent) -> Result<(), XmlError> {
        if self.strip_comments && matches!(event, XmlEvent::Comment(_)) {
            return Ok(());
        }
        let location = self.locator.as_ref().and_then(|l| l.location());
        let pushed = match &event {
            XmlEvent::StartElement { name, .. } => Some((Some(name.clone()), NodeKind::Element)),
            XmlEvent::Characters(_) => Some((None, NodeKind::Text)),
            _ => None,
        };
        let pops = matches!(event, XmlEvent::EndElement { .. } | XmlEvent::Characters(_));
        if let Some((name, kind)) = pushed {
            self.stack.0.borrow_mut().push(SourceNode {
                name,
                kind,
                location,
            });
        }

        let result = self.out.receive(event);
        if pops {
            self.stack.0.borrow_mut().pop();
        }
        result
    }
}
