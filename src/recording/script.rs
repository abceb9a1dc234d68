/// Name of the CDP binding the page calls with each captured event
pub const CAPTURE_BINDING: &str = "__formtraceCaptureEvent";

/// Attribute the page puts on an event's target so the captured snapshot
/// can point at it
pub const TARGET_MARKER_ATTR: &str = "data-formtrace-target";

/// Listener script installed in every document. Events are pushed through
/// the binding as JSON; the element is identified by a per-event token in a
/// marker attribute, and the last 16 tokens stay on the page.
///
/// Only the top-level document listens: snapshots and replay actions cover
/// the main frame alone, so events inside frames are not sent at all. The
/// listeners start paused unless a [`tracking_script`] already set the
/// page's mode.
pub const CAPTURE_SCRIPT: &str = r#"
(() => {
    if (window.top !== window) return true;
    if (window.__formtraceCapture) return true;
    window.__formtraceCapture = true;
    if (typeof window.__formtracePaused !== 'boolean') window.__formtracePaused = true;

    const MARKER = 'data-formtrace-target';
    let seq = 0;
    const recent = [];

    function tokens(el) {
        return (el.getAttribute(MARKER) || '').split(' ').filter(Boolean);
    }

    function mark(el) {
        seq += 1;
        const id = String(seq);
        el.setAttribute(MARKER, tokens(el).concat(id).join(' '));
        recent.push([el, id]);
        if (recent.length > 16) {
            const [old, oldId] = recent.shift();
            const rest = tokens(old).filter(t => t !== oldId);
            if (rest.length) old.setAttribute(MARKER, rest.join(' '));
            else old.removeAttribute(MARKER);
        }
        return id;
    }

    function send(event) {
        if (window.__formtracePaused) return;
        if (typeof __formtraceCaptureEvent !== 'function') return;
        event.url = location.href;
        __formtraceCaptureEvent(JSON.stringify(event));
    }

    function elementEvent(type, el, extra) {
        if (window.__formtracePaused) return;
        if (!el || el.nodeType !== 1) return;
        send(Object.assign({
            type,
            marker: mark(el),
            value: 'value' in el ? String(el.value) : null,
            cursor: getComputedStyle(el).cursor
        }, extra || {}));
    }

    document.addEventListener('click', (e) => elementEvent('click', e.target), true);

    document.addEventListener('change', (e) => {
        const el = e.target;
        if (el.tagName !== 'SELECT') return;
        const option = el.options[el.selectedIndex];
        elementEvent('change', el, { selectedText: option ? option.text : '' });
    }, true);

    document.addEventListener('keydown', (e) => {
        if (e.key === 'Enter') elementEvent('keydown', e.target, { key: e.key });
    }, true);

    document.addEventListener('mouseup', () => {
        const selection = window.getSelection();
        if (!selection || selection.rangeCount === 0) return;
        const text = selection.toString();
        if (!text.trim()) return;
        let ancestor = selection.getRangeAt(0).commonAncestorContainer;
        if (ancestor.nodeType !== 1) ancestor = ancestor.parentElement;
        elementEvent('mouseup', ancestor, { selectedText: text });
    }, true);

    document.addEventListener('focusin', (e) => elementEvent('focus', e.target), true);
    document.addEventListener('input', (e) => elementEvent('input', e.target), true);
    document.addEventListener('focusout', (e) => elementEvent('blur', e.target), true);

    function unload() {
        const el = document.activeElement;
        send({ type: 'unload', value: el && 'value' in el ? String(el.value) : null });
    }
    window.addEventListener('beforeunload', unload, true);
    window.addEventListener('popstate', unload, true);

    return true;
})()
"#;

/// Toggle the page-side listeners without removing them. Also registered
/// for new documents, so a page keeps its mode across navigations.
pub fn tracking_script(enabled: bool) -> String {
    format!("window.__formtracePaused = {}; true", !enabled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracking_script_sets_pause_flag() {
        assert_eq!(tracking_script(true), "window.__formtracePaused = false; true");
        assert_eq!(tracking_script(false), "window.__formtracePaused = true; true");
    }

    #[test]
    fn test_capture_script_keeps_registered_mode() {
        // starts paused, but never overrides a mode set before it ran
        assert!(CAPTURE_SCRIPT.contains("if (typeof window.__formtracePaused !== 'boolean') window.__formtracePaused = true;"));
        assert!(!CAPTURE_SCRIPT.contains("window.__formtracePaused = false"));
        // nothing is marked or sent while paused
        let element_event = CAPTURE_SCRIPT.find("function elementEvent").unwrap();
        let guard = CAPTURE_SCRIPT[element_event..].find("if (window.__formtracePaused) return;").unwrap();
        let mark = CAPTURE_SCRIPT[element_event..].find("mark(el)").unwrap();
        assert!(guard < mark);
    }

    #[test]
    fn test_capture_script_ignores_frames() {
        let frame_guard = CAPTURE_SCRIPT.find("if (window.top !== window) return true;").unwrap();
        let listeners = CAPTURE_SCRIPT.find("document.addEventListener").unwrap();
        assert!(frame_guard < listeners);
    }
}
