//! Client-side behaviour bundled into `app.js`.
//!
//! A page gets each behaviour at most once, in declaration order, and only
//! if a block needing it rendered successfully.

/// Behaviours in the order they are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Behaviour {
    NavigationToggle,
    FormSubmit,
    MapLazyLoad,
}

impl Behaviour {
    pub const ALL: [Behaviour; 3] = [
        Behaviour::NavigationToggle,
        Behaviour::FormSubmit,
        Behaviour::MapLazyLoad,
    ];

    pub fn source(self) -> &'static str {
        match self {
            Behaviour::NavigationToggle => NAVIGATION_TOGGLE,
            Behaviour::FormSubmit => FORM_SUBMIT,
            Behaviour::MapLazyLoad => MAP_LAZY_LOAD,
        }
    }
}

const NAVIGATION_TOGGLE: &str = r#"document.querySelectorAll(".sk-navigation").forEach(function (nav) {
  var toggle = nav.querySelector(".sk-nav-toggle");
  if (!toggle) return;
  toggle.addEventListener("click", function () {
    var open = nav.classList.toggle("sk-open");
    toggle.setAttribute("aria-expanded", open ? "true" : "false");
  });
});
"#;

const FORM_SUBMIT: &str = r#"document.querySelectorAll("form.sk-form").forEach(function (form) {
  form.addEventListener("submit", function (event) {
    event.preventDefault();
    var status = form.querySelector(".sk-form-status");
    fetch(form.action, { method: "POST", body: new FormData(form) })
      .then(function (res) {
        if (status) status.textContent = res.ok ? "Thanks!" : "Something went wrong.";
        if (res.ok) form.reset();
      })
      .catch(function () {
        if (status) status.textContent = "Something went wrong.";
      });
  });
});
"#;

const MAP_LAZY_LOAD: &str = r#"(function () {
  var maps = document.querySelectorAll(".sk-map[data-map-src]");
  function load(el) {
    if (el.querySelector("iframe")) return;
    var frame = document.createElement("iframe");
    frame.src = el.getAttribute("data-map-src");
    frame.loading = "lazy";
    frame.title = el.getAttribute("data-map-title") || "Map";
    el.appendChild(frame);
  }
  if (!("IntersectionObserver" in window)) {
    maps.forEach(load);
    return;
  }
  var observer = new IntersectionObserver(function (entries) {
    entries.forEach(function (entry) {
      if (entry.isIntersecting) {
        load(entry.target);
        observer.unobserve(entry.target);
      }
    });
  });
  maps.forEach(function (el) { observer.observe(el); });
})();
"#;

/// Concatenate the sources of `used` in canonical order.
pub fn bundle(used: impl IntoIterator<Item = Behaviour>) -> String {
    let mut wanted = [false; Behaviour::ALL.len()];
    for b in used {
        wanted[b as usize] = true;
    }
    Behaviour::ALL
        .iter()
        .filter(|b| wanted[**b as usize])
        .map(|b| b.source())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_empty() {
        assert_eq!(bundle(std::iter::empty()), "");
    }

    #[test]
    fn test_bundle_dedupes_and_orders() {
        let js = bundle([
            Behaviour::MapLazyLoad,
            Behaviour::NavigationToggle,
            Behaviour::MapLazyLoad,
        ]);
        assert_eq!(js.matches("IntersectionObserver(").count(), 1);
        let nav = js.find(".sk-navigation").unwrap();
        let map = js.find(".sk-map").unwrap();
        assert!(nav < map);
        assert!(!js.contains("FormData"));
    }
}
