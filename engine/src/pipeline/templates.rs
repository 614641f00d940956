//! Scaffold templates
//!
//! Guaranteed-valid file contents the stages fall back to when generated
//! content is missing or unusable. The backend is a FastAPI app with a
//! health route, the frontend a Vite + React + Tailwind app that polls it.

use std::collections::BTreeMap;
use std::path::Path;

pub const BACKEND_MAIN: &str = r#"from fastapi import FastAPI

app = FastAPI(title="Generated FastAPI Backend")


@app.get("/health")
def health():
    return {"status": "ok"}
"#;

pub const BACKEND_REQUIREMENTS: &str = "fastapi\nuvicorn\npydantic\nhttpx\npytest\n";

pub const BACKEND_TEST_HEALTH: &str = r#"from fastapi.testclient import TestClient

from backend.main import app


def test_health():
    client = TestClient(app)
    response = client.get("/health")
    assert response.status_code == 200
"#;

pub const SMOKE_TEST: &str = r#"from pathlib import Path

ROOT = Path(__file__).resolve().parent.parent


def test_backend_entrypoint_exists():
    assert (ROOT / "backend" / "main.py").is_file()


def test_frontend_manifest_exists():
    assert (ROOT / "frontend" / "package.json").is_file()
"#;

pub const PYTEST_INI: &str = "[pytest]\naddopts = -q\npythonpath = .\ntestpaths = tests backend/tests\n";

pub const DOCKERFILE: &str = r#"FROM python:3.11-slim
WORKDIR /app
COPY backend/requirements.txt ./
RUN pip install --no-cache-dir -r requirements.txt
COPY . .
EXPOSE 8000
CMD ["uvicorn", "backend.main:app", "--host", "0.0.0.0", "--port", "8000"]
"#;

pub const DOCKER_COMPOSE: &str = r#"services:
  api:
    build: .
    ports:
      - "8000:8000"
    command: uvicorn backend.main:app --host 0.0.0.0 --port 8000
  web:
    build: ./frontend
    command: npm run dev
    ports:
      - "5173:5173"
    depends_on:
      - api
"#;

pub const DEPLOY_WORKFLOW: &str = r#"name: Deploy
on: [push]
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - uses: actions/setup-python@v5
        with:
          python-version: '3.11'
      - name: Install backend deps
        run: |
          pip install -r backend/requirements.txt
      - name: Run tests
        run: pytest -q
"#;

pub const MKDOCS: &str = r#"site_name: Generated Project Docs
nav:
  - Home: index.md
theme:
  name: material
"#;

const PACKAGE_JSON: &str = r#"{
  "name": "generated-frontend",
  "private": true,
  "version": "0.0.1",
  "type": "module",
  "scripts": {
    "dev": "vite",
    "build": "vite build",
    "preview": "vite preview --port 5173"
  },
  "dependencies": {
    "react": "^18.2.0",
    "react-dom": "^18.2.0"
  },
  "devDependencies": {
    "@vitejs/plugin-react": "^4.2.0",
    "autoprefixer": "^10.4.18",
    "postcss": "^8.4.38",
    "tailwindcss": "^3.4.3",
    "vite": "^5.0.0"
  }
}
"#;

const TAILWIND_CONFIG: &str = r#"/** @type {import('tailwindcss').Config} */
export default {
  content: ['./index.html', './src/**/*.{js,ts,jsx,tsx}'],
  theme: {
    extend: {},
  },
  plugins: [],
}
"#;

const POSTCSS_CONFIG: &str = r#"export default {
  plugins: {
    tailwindcss: {},
    autoprefixer: {},
  },
}
"#;

const VITE_CONFIG: &str = r#"import { defineConfig } from 'vite'
import react from '@vitejs/plugin-react'

export default defineConfig({
  plugins: [react()],
  server: { host: '0.0.0.0', port: 5173 },
})
"#;

const MAIN_JSX: &str = r#"import React from 'react'
import ReactDOM from 'react-dom/client'
import App from './App.jsx'
import './index.css'

ReactDOM.createRoot(document.getElementById('root')).render(
  <React.StrictMode>
    <App />
  </React.StrictMode>,
)
"#;

const INDEX_CSS: &str = r#"@tailwind base;
@tailwind components;
@tailwind utilities;

html, body, #root { height: 100%; }
"#;

/// Files the build stage must leave in `frontend/`
pub const FRONTEND_REQUIRED: [&str; 4] = [
    "frontend/package.json",
    "frontend/index.html",
    "frontend/src/main.jsx",
    "frontend/src/App.jsx",
];

/// Files the build stage must leave in `backend/`
pub const BACKEND_REQUIRED: [&str; 3] = [
    "backend/main.py",
    "backend/requirements.txt",
    "backend/tests/test_health.py",
];

/// Full frontend scaffold keyed by run-relative path
pub fn frontend_scaffold(title: &str) -> BTreeMap<&'static str, String> {
    let title = html_escape(title);
    let mut files = BTreeMap::new();
    files.insert("frontend/package.json", PACKAGE_JSON.to_string());
    files.insert("frontend/tailwind.config.js", TAILWIND_CONFIG.to_string());
    files.insert("frontend/postcss.config.js", POSTCSS_CONFIG.to_string());
    files.insert("frontend/vite.config.js", VITE_CONFIG.to_string());
    files.insert("frontend/index.html", index_html(&title));
    files.insert("frontend/src/main.jsx", MAIN_JSX.to_string());
    files.insert("frontend/src/App.jsx", app_jsx(&title));
    files.insert("frontend/src/index.css", INDEX_CSS.to_string());
    files
}

/// Backend scaffold keyed by run-relative path
pub fn backend_scaffold() -> BTreeMap<&'static str, String> {
    let mut files = BTreeMap::new();
    files.insert("backend/main.py", BACKEND_MAIN.to_string());
    files.insert("backend/requirements.txt", BACKEND_REQUIREMENTS.to_string());
    files.insert("backend/tests/test_health.py", BACKEND_TEST_HEALTH.to_string());
    files
}

pub fn docs_index(title: &str) -> String {
    format!(
        "# {}\n\nWelcome! Use the README for quickstart. This site can be served with `mkdocs serve`.\n",
        title
    )
}

/// How to set up, run, test and deploy a generated project
pub fn run_commands(run_dir: &Path) -> BTreeMap<String, Vec<String>> {
    let root = run_dir.display().to_string();
    let frontend = run_dir.join("frontend").display().to_string();
    let venv = if cfg!(windows) {
        "python -m venv .venv && .venv\\Scripts\\pip install -r backend/requirements.txt"
    } else {
        "python -m venv .venv && .venv/bin/pip install -r backend/requirements.txt"
    };

    let mut commands = BTreeMap::new();
    commands.insert(
        "backend".to_string(),
        vec![
            format!("cd {}", root),
            venv.to_string(),
            "uvicorn backend.main:app --host 0.0.0.0 --port 8000".to_string(),
        ],
    );
    commands.insert(
        "frontend".to_string(),
        vec![
            format!("cd {}", frontend),
            "npm install".to_string(),
            "npm run dev".to_string(),
        ],
    );
    commands.insert(
        "tests".to_string(),
        vec![format!("cd {}", root), "pytest -q".to_string()],
    );
    commands.insert(
        "docs".to_string(),
        vec![
            format!("cd {}", root),
            "pip install mkdocs mkdocs-material && mkdocs serve".to_string(),
        ],
    );
    commands.insert(
        "deploy".to_string(),
        vec![format!("cd {}", root), "docker compose up --build".to_string()],
    );
    commands
}

fn index_html(title: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>{title}</title>
  </head>
  <body>
    <div id="root"></div>
    <script type="module" src="/src/main.jsx"></script>
  </body>
</html>
"#
    )
}

fn app_jsx(title: &str) -> String {
    format!(
        r#"import {{ useEffect, useState }} from 'react'

export default function App() {{
  const [status, setStatus] = useState('unknown')
  useEffect(() => {{
    fetch('http://localhost:8000/health')
      .then(r => setStatus(r.ok ? 'online' : 'offline'))
      .catch(() => setStatus('offline'))
  }}, [])
  return (
    <div className="min-h-screen bg-gray-50 text-gray-900">
      <header className="p-4 border-b bg-white">
        <h1 className="text-xl font-semibold">{title}</h1>
        <p className="text-sm text-gray-500">API status: {{status}}</p>
      </header>
      <main className="p-6">
        <div className="max-w-xl mx-auto bg-white shadow rounded p-4">
          <h2 className="text-lg font-medium mb-2">Welcome</h2>
          <p>This frontend was scaffolded by Forge.</p>
        </div>
      </main>
    </div>
  )
}}
"#
    )
}

/// Escape text for HTML and JSX bodies
fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '{' => out.push_str("&#123;"),
            '}' => out.push_str("&#125;"),
            _ => out.push(c),
        }
    }
    out
}
