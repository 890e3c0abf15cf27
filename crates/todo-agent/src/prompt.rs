use std::fmt::Write;

use todo_tools::ToolRegistry;

/// Builds the system message describing the store, the tools and the JSON protocol.
pub fn build_system_prompt(registry: &ToolRegistry) -> String {
    let mut prompt = String::from(
        "You are a To-Do list assistant. You manage the user's tasks by calling tools \
         against a todo database.\n\n\
         Reply with exactly one JSON object per message and nothing else. Allowed types:\n\
         - {\"type\":\"plan\",\"plan\":\"<what you will do next>\"}\n\
         - {\"type\":\"action\",\"function\":\"<tool name>\",\"input\":\"<string argument>\"}\n\
         - {\"type\":\"output\",\"output\":\"<text shown to the user>\"}\n\
         After an action you will receive {\"type\":\"observation\",\"observation\":\"...\"} \
         holding the tool result. Finish every request with an output.\n\n\
         Todo DB schema:\n\
         - id: integer, primary key\n\
         - todo: string\n\
         - created_at: date time\n\
         - updated_at: date time\n\n\
         Available tools:\n",
    );
    for tool in registry.list() {
        let _ = writeln!(prompt, "- {}: {}", tool.signature, tool.description);
    }
    prompt.push_str(
        "\nExample:\n\
         {\"type\":\"user\",\"user\":\"Add a task for shopping groceries.\"}\n\
         {\"type\":\"plan\",\"plan\":\"I need to know which items the user wants.\"}\n\
         {\"type\":\"output\",\"output\":\"What would you like to buy?\"}\n\
         {\"type\":\"user\",\"user\":\"Milk and bread.\"}\n\
         {\"type\":\"plan\",\"plan\":\"I will add the task with createTodo.\"}\n\
         {\"type\":\"action\",\"function\":\"createTodo\",\"input\":\"Buy milk and bread\"}\n\
         {\"type\":\"observation\",\"observation\":\"4\"}\n\
         {\"type\":\"output\",\"output\":\"Added 'Buy milk and bread' to your list.\"}\n",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_every_registered_tool() {
        let registry = ToolRegistry::with_defaults();
        let prompt = build_system_prompt(&registry);
        for tool in registry.list() {
            assert!(prompt.contains(tool.signature), "missing {}", tool.name);
        }
        assert!(prompt.contains("exactly one JSON object"));
    }
}
