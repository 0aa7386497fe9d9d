//! JavaScript evaluation scripts
//!
//! In-page code used by the chromium fetcher. Extraction happens in a single
//! traversal so the crawler pays one round-trip per page.

/// Extract title, headings, links, main-region text and cleaned HTML in one
/// pass. Links come from the original DOM (the browser resolves `href` to
/// absolute form); everything else is read from a clone with boilerplate
/// elements removed.
pub const EXTRACT_SCRIPT: &str = r#"
    (() => {
        const REMOVE_SELECTOR = [
            'script', 'style', 'noscript', 'iframe', 'nav', 'footer', 'header', 'aside',
            '.advertisement', '.ads', '.sidebar', '.cookie-banner', '.popup',
            '[role="banner"]', '[role="navigation"]', '[role="contentinfo"]'
        ].join(', ');

        const clone = document.documentElement.cloneNode(true);
        clone.querySelectorAll(REMOVE_SELECTOR).forEach(el => el.remove());

        const headings = Array.from(clone.querySelectorAll('h1, h2, h3, h4, h5, h6'))
            .map(h => (h.textContent || '').trim())
            .filter(t => t.length > 0);

        const links = Array.from(new Set(
            Array.from(document.querySelectorAll('a[href]'))
                .map(a => a.href)
                .filter(href => href.startsWith('http'))
        ));

        const MAIN_SELECTORS = ['main', 'article', '[role="main"]', '.content', '#content', 'body'];
        let main = null;
        for (const sel of MAIN_SELECTORS) {
            main = clone.querySelector(sel);
            if (main) break;
        }

        return {
            title: document.title || '',
            headings,
            links,
            text: main ? (main.innerText || main.textContent || '') : '',
            cleanedHtml: main ? main.innerHTML : ''
        };
    })()
"#;

/// Length of the rendered text, used by the adaptive rendering mode to decide
/// whether a network-idle wait is worthwhile
pub const BODY_TEXT_LENGTH_SCRIPT: &str =
    r"document.body ? (document.body.innerText || '').length : 0";
